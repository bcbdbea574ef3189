//! Account snapshot handed to the transaction logic

use serde::{Deserialize, Serialize};

use super::{Address, PublicKey};

/// Account state as seen by the chain core.
///
/// `balance`/`votes` are the confirmed state mutated by apply/undo,
/// `u_balance`/`u_votes` the unconfirmed state mutated by pool admission and
/// `apply_unconfirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub public_key: Option<PublicKey>,
    pub balance: i64,
    pub u_balance: i64,
    pub votes: Vec<PublicKey>,
    pub u_votes: Vec<PublicKey>,
    pub username: Option<String>,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            balance: 0,
            u_balance: 0,
            votes: Vec::new(),
            u_votes: Vec::new(),
            username: None,
        }
    }

    pub fn with_public_key(public_key: &PublicKey) -> Self {
        let mut account = Self::new(public_key.address());
        account.public_key = Some(public_key.clone());
        account
    }
}
