//! Transaction kernel for the reputation substrate.
//!
//! Every state change is a [`Transaction`]: validated, stamped with a
//! fresh nonce and logical time, hashed, optionally signed, and folded into
//! a new immutable [`KernelState`] by the pure [`apply_transaction`]
//! function. The kernel keeps the boot snapshot and the transaction log, so
//! any state can be reproduced by replay and checked with
//! [`Kernel::verify_integrity`].
//!
//! # Key Types
//!
//! - [`Kernel`]: owns the current snapshot and drives execution
//! - [`KernelState`]: immutable snapshot with a deterministic state hash
//! - [`Transaction`]: a hashed, optionally signed state change
//! - [`TransactionHandler`]: extension point for custom transaction types

pub mod config;
pub mod error;
pub mod kernel;
pub mod router;
pub mod state;
pub mod transaction;
pub mod transition;

pub use config::KernelConfig;
pub use error::{ConfigError, KernelError};
pub use kernel::{
    Execution, ExportedState, GenesisRef, IntegrityReport, Kernel, KernelExport, ReplayFailure,
    ReplayReport, KERNEL_VERSION,
};
pub use router::{Route, RouteTable};
pub use state::{IdentityRef, KernelState};
pub use transaction::{Transaction, TransactionReceipt};
pub use transition::{
    apply_transaction, DomainEvent, TransactionHandler, TransitionRules, LEDGER_APPEND,
    ROUTER_REGISTER,
};
