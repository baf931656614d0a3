/*!
# VitalSync DevKit - Stubs et utilitaires de test

- Mock MQTT pour tester le relais sans broker
- Fabriques de trames de synchro au format wire
- Harness d'assertions sur les trames publiées
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMqttClient, SyncFrameBuilder};
pub use test_utils::TestHarness;
