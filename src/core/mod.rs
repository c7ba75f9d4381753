//! 核心层：错误与结果类型、代际令牌与单槽定时器、身份与状态投影、会话编排

pub mod error;
pub mod session;
pub mod state;
pub mod timer;

pub use error::{ErrorKind, LoadOutcome, RecoveryOutcome, SaveOutcome, SkipReason, StoreError};
pub use session::{CapturedImage, ExplorerSession, SessionOptions};
pub use state::{Identity, IdentityKind, SessionStatus};
pub use timer::{Generation, TimerSlot};
