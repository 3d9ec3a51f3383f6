// Tab Groups services
// Services provide stateless or file-backed functionality: the snapshot codec and the settings engine.

pub mod settings_engine;
pub mod snapshot_codec;
