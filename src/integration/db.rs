use std::env;
use std::time::Duration;

use crate::actor;

#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
    db: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 27017,
            db: String::from("campus_messenger"),
        }
    }
}

impl Config {
    pub fn env() -> super::Result<Self> {
        let host = env::var("MONGO_HOST")?;
        let port = env::var("MONGO_PORT")?.parse()?;
        let db = env::var("MONGO_DB")?;
        Ok(Self { host, port, db })
    }

    pub fn connect(&self) -> mongodb::Database {
        let options = mongodb::options::ClientOptions::builder()
            .hosts(vec![mongodb::options::ServerAddress::Tcp {
                host: self.host.to_owned(),
                port: Some(self.port),
            }])
            .server_selection_timeout(Some(Duration::from_secs(2)))
            .connect_timeout(Some(Duration::from_secs(5)))
            .build();

        match mongodb::Client::with_options(options).map(|client| client.database(&self.db)) {
            Ok(db) => db,
            Err(e) => panic!("Failed to connect to MongoDB: {e}"),
        }
    }
}

impl From<actor::Kind> for mongodb::bson::Bson {
    fn from(kind: actor::Kind) -> Self {
        mongodb::bson::Bson::String(kind.as_str().to_string())
    }
}

#[cfg(test)]
pub mod test {
    use testcontainers_modules::mongo::Mongo;
    use testcontainers_modules::testcontainers::ContainerAsync;

    use super::Config;

    impl Config {
        pub async fn test(node: &ContainerAsync<Mongo>) -> Self {
            Self {
                host: node.get_host().await.unwrap().to_string(),
                port: node.get_host_port_ipv4(27017).await.unwrap(),
                db: String::from("test_campus_messenger"),
            }
        }
    }
}
