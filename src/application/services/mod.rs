//! # Application Services
//!
//! Services that orchestrate domain logic and infrastructure.
//!
//! - [`TimelineLog`]: append-only event log with visibility filtering
//! - [`SendAttemptLedger`]: send attempts, retry chains and outcomes
//! - [`RfqStateMachine`]: legal RFQ transitions with exactly-once events
//! - [`RfqDispatcher`]: send requests, callbacks, award and cancellation
//! - [`DispatchWorker`] and [`DispatchPool`]: background delivery

pub mod dispatcher;
pub mod ledger;
pub mod pool;
pub mod state_machine;
pub mod timeline;
pub mod worker;

pub use dispatcher::{
    AttemptRef, CallbackReport, RfqDispatcher, SendReceipt, SendRequest, Settlement,
    TransportCallback,
};
pub use ledger::{
    AttemptRequest, ChannelOutcome, Outcome, OverallOutcome, RecordedOutcome, SendAttemptLedger,
    TargetOutcome, TargetState,
};
pub use pool::{DispatchJob, DispatchPool, DispatchQueue, DispatchReceiver};
pub use state_machine::{RfqStateMachine, Transition, TransitionContext};
pub use timeline::{
    Actor, AttachmentRequest, CommentRequest, CorrectionRequest, PostedComment, TimelineLog,
};
pub use worker::{DispatchWorker, ProcessOutcome};
