// src/sim_eval/mod.rs
//
// Policy evaluation: baseline controller, rollouts, statistics and reports.

pub mod baseline;
pub mod evaluator;
pub mod report;
pub mod rollout;
pub mod stats;

pub use baseline::BaselineController;
pub use evaluator::{EvaluationReport, Evaluator, MatchedEpisode, PolicyAggregate};
pub use report::{
    print_console_summary, write_json_report, write_markdown_report, write_reports, REPORT_JSON, REPORT_MARKDOWN,
};
pub use rollout::{rollout_episodes, EpisodeStats};
pub use stats::{cohens_d, welch_t_test, Summary, TTestResult};
