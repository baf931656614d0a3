/**
 * CONTACTS D'URGENCE - Carnet local de la surface compagnon
 *
 * RÔLE : ajout/suppression/listing des personnes à prévenir en cas d'urgence.
 * Pas de persistance (mémoire du processus) et pas de synchro inter-surfaces :
 * le carnet est une configuration propre à l'appareil.
 */

use crate::models::EmergencyContact;
use serde::Deserialize;
use uuid::Uuid;

/// Requête de création reçue de la présentation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub id: Option<String>,
    pub display_name: String,
    pub phone_number: String,
    pub auto_dial_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    contacts: Vec<EmergencyContact>,
}

impl ContactBook {
    /// Carnet de départ avec le médecin traitant
    pub fn with_seed() -> Self {
        Self {
            contacts: vec![EmergencyContact {
                id: "1".into(),
                display_name: "Dr. Smith".into(),
                phone_number: "555-0123".into(),
                auto_dial_enabled: true,
            }],
        }
    }

    /// Ajoute un contact ; l'id est généré s'il est absent ou vide.
    /// Retourne None si l'id fourni existe déjà.
    pub fn add(&mut self, new: NewContact) -> Option<EmergencyContact> {
        let id = match new.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        if self.contacts.iter().any(|c| c.id == id) {
            return None;
        }

        let contact = EmergencyContact {
            id,
            display_name: new.display_name,
            phone_number: new.phone_number,
            auto_dial_enabled: new.auto_dial_enabled.unwrap_or(true),
        };
        self.contacts.push(contact.clone());
        tracing::info!(contact_id = %contact.id, "emergency contact added");
        Some(contact)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let initial_len = self.contacts.len();
        self.contacts.retain(|c| c.id != id);
        let removed = self.contacts.len() < initial_len;
        if removed {
            tracing::info!(contact_id = %id, "emergency contact removed");
        }
        removed
    }

    pub fn list(&self) -> Vec<EmergencyContact> {
        self.contacts.clone()
    }
}
