mod persistence;
mod service;
mod view;

pub use persistence::{EXAM_SNAPSHOT_KEY, SavedSessionInfo, SnapshotPersistence};
pub use service::ExamService;
pub use view::{AnswerFeedback, ExamView, QuestionView};
