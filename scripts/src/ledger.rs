//! The deployment ledger: the addresses produced by the steps of one run

use alloy::primitives::Address;

/// An insertion-ordered, append-only mapping from step name to deployed
/// address.
///
/// A ledger belongs to a single run of the pipeline. Entries are written
/// once, when a step's deployment is confirmed, and never change afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentLedger {
    /// The recorded entries, in the order the steps completed
    entries: Vec<(String, Address)>,
}

impl DeploymentLedger {
    /// An empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address deployed by a step.
    ///
    /// Returns `false` without modifying the ledger if the step already has
    /// an entry.
    pub fn record(&mut self, step: &str, address: Address) -> bool {
        if self.get(step).is_some() {
            return false;
        }

        self.entries.push((step.to_string(), address));
        true
    }

    /// The address deployed by the given step, if it completed
    pub fn get(&self, step: &str) -> Option<Address> {
        self.entries
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, address)| *address)
    }

    /// Iterate over the entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries.iter().map(|(name, address)| (name.as_str(), *address))
    }

    /// The number of recorded steps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no step has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::DeploymentLedger;

    #[test]
    fn test_append_only() {
        let mut ledger = DeploymentLedger::new();
        let first = Address::with_last_byte(1);
        let second = Address::with_last_byte(2);

        assert!(ledger.record("Time", first));
        assert!(!ledger.record("Time", second));
        assert_eq!(ledger.get("Time"), Some(first));
        assert_eq!(ledger.get("Land"), None);
    }

    #[test]
    fn test_insertion_order() {
        let mut ledger = DeploymentLedger::new();
        ledger.record("LandType", Address::with_last_byte(2));
        ledger.record("Time", Address::with_last_byte(1));

        let names: Vec<&str> = ledger.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["LandType", "Time"]);
        assert_eq!(ledger.len(), 2);
    }
}
