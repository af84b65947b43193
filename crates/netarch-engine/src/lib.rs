pub mod account;
pub mod diagnosis;
pub mod error;
pub mod inquiry;
pub mod session;
pub mod tutor;
pub mod workshop;

pub use diagnosis::{DiagnosisRequest, DIAGNOSIS_TOPICS};
pub use error::EngineError;
pub use session::{
    HistoryEntry, HistoryList, ModuleView, Phase, ProgressCounter, SessionContext, SessionView,
    SignedInUser, PROGRESS_MAX,
};
pub use tutor::{entry_title, Tutor};
pub use workshop::{RevealedSolution, TaskRequest};
