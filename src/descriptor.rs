//! Database and collection descriptors: the JSON triples/pairs the
//! scripting bridge uses to name a database or collection anywhere on
//! the fleet, independent of any in-process handle.

use serde::{Deserialize, Serialize};

use crate::provider::rpc::Endpoint;

/// Identifies one database: the provider hosting it plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub address: String,
    pub provider_id: u16,
    pub database_name: String,
}

impl DatabaseDescriptor {
    pub fn new(address: impl Into<String>, provider_id: u16, database_name: impl Into<String>) -> Self {
        DatabaseDescriptor {
            address: address.into(),
            provider_id,
            database_name: database_name.into(),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.address.clone(),
            provider_id: self.provider_id,
        }
    }
}

/// Identifies one collection inside one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub database: DatabaseDescriptor,
    pub collection_name: String,
}

impl CollectionDescriptor {
    pub fn new(database: DatabaseDescriptor, collection_name: impl Into<String>) -> Self {
        CollectionDescriptor {
            database,
            collection_name: collection_name.into(),
        }
    }
}
