use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// The closed set of QBO entity types we replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Customer,
    Invoice,
}

impl ObjectType {
    pub const ALL: [ObjectType; 2] = [ObjectType::Customer, ObjectType::Invoice];

    /// Entity name as it appears in QBO queries and the sync_states table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Customer => "Customer",
            ObjectType::Invoice => "Invoice",
        }
    }

    /// Lowercase plural label used in reports and API responses.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectType::Customer => "customers",
            ObjectType::Invoice => "invoices",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Customer" => Ok(ObjectType::Customer),
            "Invoice" => Ok(ObjectType::Invoice),
            other => Err(format!("unknown object type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips() {
        for ot in ObjectType::ALL {
            assert_eq!(ot.as_str().parse::<ObjectType>().unwrap(), ot);
        }
    }

    #[test]
    fn object_type_rejects_unknown() {
        assert!("Payment".parse::<ObjectType>().is_err());
    }

    #[test]
    fn labels_are_plural_lowercase() {
        assert_eq!(ObjectType::Customer.label(), "customers");
        assert_eq!(ObjectType::Invoice.label(), "invoices");
    }
}
