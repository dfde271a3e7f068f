//! Registry of card-acceptance protocols.
//!
//! Each protocol names the exact approval-code length it requires. The
//! registry is built once at startup and is read-only afterwards, so it can be
//! shared freely between concurrent submissions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Offline risk class of a protocol, ordered from least to most risky.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    Low,
    #[default]
    Standard,
    High,
}

/// A card-acceptance protocol variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: String,
    pub label: String,
    pub approval_length: usize,
    #[serde(default)]
    pub risk_class: RiskClass,
}

impl Protocol {
    pub fn new(id: &str, label: &str, approval_length: usize, risk_class: RiskClass) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            approval_length,
            risk_class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("protocol table is empty")]
    Empty,
    #[error("protocol '{0}' is defined more than once")]
    DuplicateProtocol(String),
    #[error("protocol '{id}' has invalid approval length {length}")]
    InvalidApprovalLength { id: String, length: usize },
}

/// Read-only protocol table with insertion-ordered listing.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    protocols: Vec<Protocol>,
    index: HashMap<String, usize>,
}

impl ProtocolRegistry {
    /// Build a registry, rejecting duplicate ids and zero approval lengths.
    pub fn new(protocols: impl IntoIterator<Item = Protocol>) -> Result<Self, RegistryError> {
        let protocols: Vec<Protocol> = protocols.into_iter().collect();
        if protocols.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut index = HashMap::with_capacity(protocols.len());
        for (position, protocol) in protocols.iter().enumerate() {
            if protocol.approval_length == 0 {
                return Err(RegistryError::InvalidApprovalLength {
                    id: protocol.id.clone(),
                    length: protocol.approval_length,
                });
            }
            if index.insert(protocol.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateProtocol(protocol.id.clone()));
            }
        }

        Ok(Self { protocols, index })
    }

    /// Registry over [`builtin_protocols`].
    pub fn builtin() -> Self {
        let protocols = builtin_protocols();
        let index = protocols
            .iter()
            .enumerate()
            .map(|(position, protocol)| (protocol.id.clone(), position))
            .collect();
        Self { protocols, index }
    }

    pub fn lookup(&self, id: &str) -> Option<&Protocol> {
        self.index.get(id).map(|&position| &self.protocols[position])
    }

    /// All protocols in the order they were loaded.
    pub fn list(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

/// The protocol table shipped with the terminal.
pub fn builtin_protocols() -> Vec<Protocol> {
    use RiskClass::{High, Low, Standard};

    vec![
        Protocol::new("POS Terminal -101.1", "POS Terminal 101.1 (4-digit approval)", 4, High),
        Protocol::new("POS Terminal -101.3", "POS Terminal 101.3 (6-digit approval)", 6, Standard),
        Protocol::new("POS Terminal -101.4", "POS Terminal 101.4 (6-digit approval)", 6, Standard),
        Protocol::new("POS Terminal -101.6", "POS Terminal 101.6 (6-digit approval)", 6, Standard),
        Protocol::new("POS Terminal -101.7", "POS Terminal 101.7 (4-digit approval)", 4, High),
        Protocol::new("POS Terminal -101.8", "POS Terminal 101.8 (4-digit approval)", 4, High),
        Protocol::new("POS Terminal -201.1", "POS Terminal 201.1 (6-digit approval)", 6, Low),
        Protocol::new("POS Terminal -201.3", "POS Terminal 201.3 (6-digit approval)", 6, Low),
        Protocol::new("POS Terminal -201.5", "POS Terminal 201.5 (6-digit approval)", 6, Low),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let registry = ProtocolRegistry::builtin();
        assert_eq!(registry.lookup("POS Terminal -101.1").unwrap().approval_length, 4);
        assert_eq!(registry.lookup("POS Terminal -201.1").unwrap().approval_length, 6);
        assert_eq!(registry.lookup("POS Terminal -201.5").unwrap().approval_length, 6);
        assert!(registry.lookup("POS Terminal -999.9").is_none());
        // ids are matched exactly
        assert!(registry.lookup("pos terminal -101.1").is_none());
    }

    #[test]
    fn builtin_table_is_a_valid_registry() {
        let checked = ProtocolRegistry::new(builtin_protocols()).unwrap();
        assert_eq!(checked.len(), ProtocolRegistry::builtin().len());
    }

    #[test]
    fn list_keeps_insertion_order() {
        let registry = ProtocolRegistry::new(vec![
            Protocol::new("b", "B", 6, RiskClass::Low),
            Protocol::new("a", "A", 4, RiskClass::High),
            Protocol::new("c", "C", 6, RiskClass::Standard),
        ])
        .unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let result = ProtocolRegistry::new(vec![
            Protocol::new("a", "A", 6, RiskClass::Low),
            Protocol::new("a", "A again", 4, RiskClass::Low),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateProtocol("a".into()));
    }

    #[test]
    fn zero_length_is_rejected() {
        let result = ProtocolRegistry::new(vec![Protocol::new("a", "A", 0, RiskClass::Low)]);
        assert!(matches!(result, Err(RegistryError::InvalidApprovalLength { length: 0, .. })));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert_eq!(ProtocolRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn risk_class_ordering_and_default() {
        assert!(RiskClass::Low < RiskClass::Standard);
        assert!(RiskClass::Standard < RiskClass::High);
        assert_eq!(RiskClass::default(), RiskClass::Standard);
    }
}
