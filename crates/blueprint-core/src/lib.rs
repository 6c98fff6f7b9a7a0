//! Blueprint Core: Template, Operator trait and Transaction engine
//!
//! A [`Transaction`] applies an ordered list of [`TransactionOperator`]s to an
//! immutable [`Template`] and yields a new template.
//!
//! ```text
//! create_pos → create_data_for_pos → transform_data → transform_pos
//!     ↓                ↓                   ↓                ↓
//!  positions       overlay          distinct data      final positions
//! ```

pub mod context;
pub mod error;
pub mod operator;
pub mod report;
pub mod template;
pub mod transaction;

pub use context::TransactionConfig;
pub use error::{ErrorKind, OperatorError, Phase, SourceError, TransactionError};
pub use operator::{
    Characteristic, Characteristics, DataCreation, OperatorResult, Transform, TransactionOperator,
};
pub use report::{ExecutionOutcome, ExecutionReport, Strategy};
pub use template::{Data, Position, Template, TemplateSource};
pub use transaction::{SharedOperator, Transaction, TransactionState};

/// Blueprint engine version
pub const BLUEPRINT_VERSION: &str = "1.0.0";
