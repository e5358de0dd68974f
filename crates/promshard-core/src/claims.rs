//! Instance address claims
//!
//! An instance address may belong to at most one pool of a kind. A second
//! claim is rejected rather than merged.

use crate::{Error, RecordId, Result};
use std::collections::{HashMap, HashSet};

/// A pool's claim on a set of instance addresses.
///
/// Claims are told apart by pool id; the name is only used in messages.
#[derive(Debug, Clone, Copy)]
pub struct Claim<'a> {
    pub id: RecordId,
    pub pool: &'a str,
    pub addresses: &'a [String],
}

impl<'a> Claim<'a> {
    pub fn new(id: RecordId, pool: &'a str, addresses: &'a [String]) -> Self {
        Self { id, pool, addresses }
    }
}

/// An address claimed by more than one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimConflict {
    pub address: String,
    /// Pool that claimed the address first, in list order
    pub owner: String,
    /// Pool whose claim was rejected
    pub rejected: String,
}

impl std::fmt::Display for ClaimConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "instance {} is already claimed by pool {} (rejected claim from pool {})",
            self.address, self.owner, self.rejected
        )
    }
}

/// Find every address claimed by more than one pool.
///
/// The first claimant in iteration order owns an address; each later claimant
/// yields one conflict. Repeating an address inside the same pool is not a
/// conflict.
pub fn find_conflicts<'a, I>(claims: I) -> Vec<ClaimConflict>
where
    I: IntoIterator<Item = Claim<'a>>,
{
    let mut owners: HashMap<&str, (RecordId, &str)> = HashMap::new();
    let mut conflicts = Vec::new();

    for claim in claims {
        let mut seen = HashSet::new();
        for address in claim.addresses {
            if !seen.insert(address.as_str()) {
                continue;
            }
            match owners.get(address.as_str()) {
                Some((owner_id, owner)) if *owner_id != claim.id => {
                    conflicts.push(ClaimConflict {
                        address: address.clone(),
                        owner: owner.to_string(),
                        rejected: claim.pool.to_string(),
                    })
                }
                Some(_) => {}
                None => {
                    owners.insert(address.as_str(), (claim.id, claim.pool));
                }
            }
        }
    }

    conflicts
}

/// Reject `candidate` if any of its addresses belongs to another pool.
///
/// Existing claims from the same pool id are ignored so that an update of a
/// pool may keep its own addresses.
pub fn ensure_unclaimed<'a, I>(existing: I, candidate: Claim<'_>) -> Result<()>
where
    I: IntoIterator<Item = Claim<'a>>,
{
    for claim in existing {
        if claim.id == candidate.id {
            continue;
        }
        if let Some(address) = candidate
            .addresses
            .iter()
            .find(|address| claim.addresses.contains(address))
        {
            return Err(Error::validation(
                ClaimConflict {
                    address: address.clone(),
                    owner: claim.pool.to_string(),
                    rejected: candidate.pool.to_string(),
                }
                .to_string(),
            ));
        }
    }
    Ok(())
}
