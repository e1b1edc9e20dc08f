//! Instruction footprint profiling
//!
//! Counts every static instruction (PC) of a trace, keeps a short local
//! history per instruction and renders the linear and ranked reports.

pub mod entry;
pub mod history;
pub mod profiler;
pub mod report;
pub mod table;

pub use entry::{FootprintEntry, LocalHistory, Sighting, Window};
pub use history::{BranchHistory, HistoryRing, StrideRing, LOCAL_HISTORY_LEN};
pub use profiler::{
    Classifier, DecoderClassifier, EventClassifier, Flow, Footprint, FootprintProfiler, Maxima,
    ProfileStats,
};
pub use report::{
    build_blocks, rank_blocks, sorted_path, with_commas, write_linear_report, write_reports,
    write_sorted_report, ReportLayout, ReportSummary, SortedBlock,
};
pub use table::{FootprintTable, FootprintTables, Lookup, LookupMode};
