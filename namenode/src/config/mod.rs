use figment::{
    Figment,
    providers::{Format, Yaml},
};
use once_cell::sync::Lazy;
use serde::Deserialize;

fn default_id() -> String {
    proto::packet::NAMENODE_ID.to_owned()
}
fn default_listen_addrs() -> String {
    "localhost:8080".to_owned()
}
fn default_log_level() -> String {
    "info".to_owned()
}
fn default_log_base() -> String {
    "./logs".to_owned()
}
fn default_placement_policy() -> String {
    "least_loaded".to_owned()
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_idle_read_timeout_secs() -> u64 {
    300
}
fn default_datanode_liveness_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_listen_addrs")]
    pub listen_addrs: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_base")]
    pub log_base: String,
    // "least_loaded" or "random"
    #[serde(default = "default_placement_policy")]
    pub placement_policy: String,
    #[serde(default = "default_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub header_queue_capacity: usize,
    #[serde(default = "default_idle_read_timeout_secs")]
    pub idle_read_timeout_secs: u64,
    #[serde(default = "default_datanode_liveness_timeout_secs")]
    pub datanode_liveness_timeout_secs: u64,
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./namenode/config/{}.yaml", env));
    Figment::new()
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap()
});
