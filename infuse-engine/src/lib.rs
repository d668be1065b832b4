//! INFUSE checks consistency rules incrementally over a stream of
//! context changes.
//!
//! A rule is a first-order formula over patterns of contexts; every
//! change to a pattern may flip the truth of the rules that quantify
//! over it.  The engine keeps a Consistency Computation Tree (CCT) per
//! rule and, for each evaluation round, records the rule's truth and
//! its *links*: the variable assignments witnessing that truth.
//!
//! How a round patches the CCT is up to the `Checker` technique (ECC,
//! PCC, ConC, BASE, INFUSE_C); how changes are grouped into rounds is
//! up to the `Scheduler` strategy (IMD, GEAS_ori, GEAS_opt_s,
//! GEAS_opt_c, INFUSE_S).  Every combination records the same final
//! truth and links for the same stream.
mod approach;
mod bfunc;
mod cct;
mod checker;
mod context;
mod engine;
mod error;
mod link;
pub mod reference;
mod rule;
mod scheduler;

pub use approach::Approach;
pub use bfunc::Arguments;
pub use bfunc::BehaviorFunctions;
pub use bfunc::FunctionTable;
pub use cct::BranchMode;
pub use cct::Cct;
pub use cct::EditReport;
pub use cct::Edits;
pub use cct::NodeId;
pub use checker::make_checker;
pub use checker::Checker;
pub use checker::CheckerCore;
pub use checker::RoundCost;
pub use checker::Technique;
pub use context::ChangeType;
pub use context::Context;
pub use context::ContextChange;
pub use context::ContextPool;
pub use context::DeltaSets;
pub use context::Pattern;
pub use context::PatternHandler;
pub use context::RuleView;
pub use engine::Engine;
pub use error::Error;
pub use link::typed_links;
pub use link::Assignment;
pub use link::Binding;
pub use link::Link;
pub use link::LinkSet;
pub use link::LinkType;
pub use rule::Formula;
pub use rule::FormulaBuilder;
pub use rule::FormulaId;
pub use rule::FormulaKind;
pub use rule::LinkRecord;
pub use rule::Rule;
pub use rule::RuleHandler;
pub use rule::Sensitivity;
pub use scheduler::make_scheduler;
pub use scheduler::Scheduler;
pub use scheduler::Strategy;
