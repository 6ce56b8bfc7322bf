//! Message Partition Channels

use crate::core_message::envelope::DEFAULT_MPC;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Object-type tag carried by MPC configuration entities
pub const MPC_OBJECT_TYPE: &str = "as4.mpc";

/// A named channel through which pulled User Messages are routed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mpc {
    id: String,
}

impl Mpc {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The ebMS default partition channel
    pub fn default_mpc() -> Self {
        Self::new(DEFAULT_MPC)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn object_type(&self) -> &'static str {
        MPC_OBJECT_TYPE
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_MPC
    }
}

impl fmt::Display for Mpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mpc() {
        let mpc = Mpc::default_mpc();
        assert!(mpc.is_default());
        assert_eq!(mpc.object_type(), "as4.mpc");
        assert!(!Mpc::new("urn:mpc:default").is_default());
    }
}
