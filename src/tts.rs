pub mod audio;
pub mod cloud;
pub mod local;
pub mod orchestrator;
pub mod provider;
pub mod provider_id;
pub mod resolver;
pub mod text;

#[cfg(test)]
pub mod testing;
