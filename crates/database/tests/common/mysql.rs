//! MySQL test database managed by a testcontainer.

use coldstart_core::config::DatabaseConfig;
use coldstart_database::{DatabaseError, DatabaseResult, MySqlStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;

/// Stable prefix for Docker/container startup failures in MySQL test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const MYSQL_CONTAINER_START_ERR_PREFIX: &str = "mysql-container-start:";

pub const MYSQL_SCHEMA: &str = r#"
CREATE TABLE users (id BIGINT PRIMARY KEY, username VARCHAR(255) NOT NULL) ENGINE=InnoDB;
CREATE TABLE users_secure (
    id BIGINT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id)
) ENGINE=InnoDB;
CREATE TABLE globals (
    gl_name VARCHAR(63) NOT NULL,
    gl_index INT NOT NULL DEFAULT 0,
    gl_value VARCHAR(255),
    PRIMARY KEY (gl_name, gl_index)
) ENGINE=InnoDB;
CREATE TABLE `keys` (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    name VARCHAR(20) NOT NULL UNIQUE,
    value TEXT
) ENGINE=InnoDB;
CREATE TABLE oauth_clients (
    client_id VARCHAR(80) PRIMARY KEY,
    client_name VARCHAR(255) NOT NULL,
    client_secret TEXT,
    is_enabled TINYINT(1) NOT NULL DEFAULT 0
) ENGINE=InnoDB;
"#;

/// MySQL store plus the container keeping it alive.
pub struct MySqlTestDatabase {
    pub store: MySqlStore,
    _container: ContainerAsync<Mysql>,
}

impl MySqlTestDatabase {
    pub async fn new() -> DatabaseResult<Self> {
        let container = Mysql::default().start().await.map_err(|e| {
            DatabaseError::Config(format!(
                "{MYSQL_CONTAINER_START_ERR_PREFIX} Failed to start MySQL container: {e}"
            ))
        })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules mysql
        let config = DatabaseConfig {
            host: host.to_string(),
            port,
            login: "root".to_string(),
            password: String::new(),
            name: "test".to_string(),
            ..DatabaseConfig::default()
        };

        Ok(Self {
            store: MySqlStore::connect_lazy(&config),
            _container: container,
        })
    }
}
