/*!
Devkit Carrefour - outillage de développement et de test

Facilite le développement du noyau sans broker MQTT ni installation réelle:
- StubStore: magasin en mémoire scriptable (histoire append-only, pannes
  injectables, push simulé, réponses retardables)
- builders: fabrique de lignes traffic_data / traffic_config réalistes
*/

pub mod builders;
pub mod stub_store;
