mod exam;
mod ids;
mod mode;
mod question;
mod score;
pub mod settings;
mod snapshot;
pub mod syllabus;

pub use ids::{Generation, QuestionId};

pub use exam::{
    EXAM_DURATION_SECS, ExamError, ExamPhase, ExamSelection, ExamSession, INITIAL_BATCH_SIZE,
    PREFETCH_BATCH_SIZE,
};
pub use mode::{ExamMode, ModeError};
pub use question::{OPTION_COUNT, Question, QuestionDraft, QuestionError, option_from_letter, option_letter};
pub use score::{ExamScore, SubjectScore};
pub use settings::{AiSettings, AiSettingsDraft, AiSettingsError};
pub use snapshot::{ExamSnapshot, SNAPSHOT_VERSION, SnapshotError};
pub use syllabus::{Subject, TopicArea};
