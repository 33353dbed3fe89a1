use std::net::SocketAddr;

use envconfig::Envconfig;
use tracing::Level;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "0.0.0.0:3000")]
    pub address: SocketAddr,

    // Appended to on every device request, served back on /logs
    #[envconfig(default = "attendance_logs.txt")]
    pub log_file: String,

    // Holds one attendance_<date>.txt per day
    #[envconfig(default = "logs")]
    pub log_dir: String,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(default = "info")]
    pub log_level: Level,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_the_device_setup() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert!(!config.print_sink);
        assert_eq!(config.address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_file, "attendance_logs.txt");
        assert_eq!(config.log_dir, "logs");
        assert!(config.export_prometheus);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn reads_overrides() {
        let env = HashMap::from([
            ("PRINT_SINK".to_string(), "true".to_string()),
            ("ADDRESS".to_string(), "127.0.0.1:8081".to_string()),
            ("LOG_LEVEL".to_string(), "debug".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert!(config.print_sink);
        assert_eq!(config.address.port(), 8081);
        assert_eq!(config.log_level, Level::DEBUG);
    }
}
