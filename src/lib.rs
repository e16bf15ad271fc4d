//! Module: Lib
//! But: Deterministic BIP-32 connection key-pair pools, derived in bulk or
//! across a partitioned worker pool.
//!
//! Each pair at index `i` holds the compressed public keys at
//! `m/44/60'/0'/0/i` and `m/44/60'/0'/1/i`.
//!
//! *Signed: kryon.kas*

pub mod bulk;
pub mod config;
pub mod error;
pub mod keypair;
pub mod merge;
pub mod partition;
pub mod path;
pub mod seed;
pub mod worker;

pub use bulk::{DEFAULT_POOL_SIZE, generate_pool, generate_pool_with};
pub use config::{FailurePolicy, PoolConfig};
pub use error::{KeyPoolError, Result, WorkerFailureCause};
pub use keypair::{KeyPair, PublicKeyBytes};
pub use merge::merge;
pub use partition::{DerivationJob, SliceAssignment, generate_partitioned, plan_slices};
pub use path::{ConnType, DEFAULT_PATH_TEMPLATE, PathTemplate, derive_pair, derive_range};
pub use seed::{RootNode, SeedMaterial, generate_random_mnemonic, resolve_root};
pub use worker::{WorkerRequest, WorkerResponse};
