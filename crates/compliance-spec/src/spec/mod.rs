pub mod control;
pub mod definition;
pub mod feedback;
pub mod form;
pub mod group;
pub mod rule;

pub use control::{Control, CorrectOption, detail_key};
pub use definition::{FormDefinition, inject_static_fields};
pub use feedback::{ControlNote, FeedbackFile, FeedbackSeverity};
pub use form::{FormLink, Questionnaire, ReviewMetadata, SubType};
pub use group::{Group, GroupVariant};
pub use rule::{Rule, RuleEffect, RuleSchema};
