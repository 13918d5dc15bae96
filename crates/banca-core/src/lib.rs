pub mod clock;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;
pub mod requests;
pub mod storage;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BankError, BankResult, VersionConflict};
pub use events::{MovementEvent, OperationType};
pub use ids::{IdSource, RandomIds, SequentialIds};
pub use models::{
    Account, Card, CardPayment, Client, DirectDebit, DirectDebitState, Movement, MovementKind,
    MovementPayload, PayloadParts, PayrollIncome, Periodicity, Transfer, UserRef,
};
pub use requests::{
    CreateCardPayment, CreateDirectDebit, CreatePayrollIncome, CreateTransfer, OpenAccount,
};
pub use storage::{BalanceLedger, CardDirectory, MovementRepository, NotificationEmitter};
pub use validation::FieldErrors;
