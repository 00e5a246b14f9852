//! Read-only view over signature-grouped tuple memories.

use alloc::vec::Vec;
use rete_core::{Tuple, TupleMask};

/// Lookup of tuple groups by signature.
///
/// A signature is the projection of a tuple through [`SignatureIndex::mask`].
/// Implemented by both timeless and timely masked memories so dual-input
/// nodes can query either kind the same way.
pub trait SignatureIndex {
    /// The projection that produces signatures.
    fn mask(&self) -> &TupleMask;

    /// Number of non-empty groups.
    fn signature_count(&self) -> usize;

    /// Returns true if the group for `signature` is non-empty.
    fn contains_signature(&self, signature: &Tuple) -> bool;

    /// The distinct tuples of a group with their multiplicities.
    fn group(&self, signature: &Tuple) -> Vec<(Tuple, u32)>;

    /// All non-empty signatures.
    fn signatures(&self) -> Vec<Tuple>;

    /// Total multiplicity of a group.
    fn group_size(&self, signature: &Tuple) -> usize {
        self.group(signature).iter().map(|(_, c)| *c as usize).sum()
    }
}
