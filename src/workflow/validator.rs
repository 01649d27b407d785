//! Job Graph Validation
//!
//! Checks the `needs` edges of an expanded workflow:
//! - Every dependency names an existing job
//! - No job depends on itself
//! - The dependency graph has no cycles
//!
//! Problems are reported as warnings only. The workflow is written out
//! regardless and the CI runner has the final say.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, warn};

use super::model::{JobEntry, WorkflowDocument};

/// Problems found in the job dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    UnknownNeed { job: String, need: String },
    SelfNeed(String),
    Cycle(Vec<String>),
}

impl std::fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNeed { job, need } => {
                write!(f, "Job '{}' needs unknown job '{}'", job, need)
            }
            Self::SelfNeed(job) => write!(f, "Job '{}' needs itself", job),
            Self::Cycle(jobs) => {
                write!(f, "Jobs depend on each other in a loop: {}", jobs.join(", "))
            }
        }
    }
}

/// Returns each job's `needs` list, in job order.
fn dependencies(document: &WorkflowDocument) -> Vec<(&str, Vec<String>)> {
    document
        .jobs
        .iter()
        .map(|(name, entry)| {
            let needs = match entry {
                JobEntry::Job(job) => job.needs(),
                JobEntry::Include(include) => include.needs.clone(),
            };
            (name.as_str(), needs)
        })
        .collect()
}

/// Checks the `needs` graph of a workflow.
pub fn check_job_graph(document: &WorkflowDocument) -> Vec<GraphWarning> {
    let deps = dependencies(document);
    let names: HashSet<&str> = deps.iter().map(|(name, _)| *name).collect();
    let mut warnings = Vec::new();

    for (job, needs) in &deps {
        for need in needs {
            if need == job {
                warnings.push(GraphWarning::SelfNeed(job.to_string()));
            } else if !names.contains(need.as_str()) {
                warnings.push(GraphWarning::UnknownNeed {
                    job: job.to_string(),
                    need: need.clone(),
                });
            }
        }
    }

    let stuck = unsortable_jobs(&deps, &names);
    if !stuck.is_empty() {
        warnings.push(GraphWarning::Cycle(stuck));
    }

    warnings
}

/// Runs Kahn's algorithm over the valid edges and returns the jobs that
/// never reach in-degree zero, in job order.
fn unsortable_jobs(deps: &[(&str, Vec<String>)], names: &HashSet<&str>) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for (job, needs) in deps {
        let valid: HashSet<&str> = needs
            .iter()
            .map(String::as_str)
            .filter(|n| names.contains(n) && n != job)
            .collect();
        in_degree.insert(*job, valid.len());
        for need in valid {
            successors.entry(need).or_default().push(*job);
        }
    }

    let mut queue: VecDeque<&str> = deps
        .iter()
        .map(|(job, _)| *job)
        .filter(|job| in_degree.get(job) == Some(&0))
        .collect();

    let mut sorted = 0;
    while let Some(current) = queue.pop_front() {
        sorted += 1;
        for next in successors.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if sorted == deps.len() {
        return Vec::new();
    }

    deps.iter()
        .map(|(job, _)| *job)
        .filter(|job| in_degree.get(job).is_some_and(|d| *d > 0))
        .map(str::to_string)
        .collect()
}

/// Logs every job graph problem as a warning.
pub fn log_job_graph_warnings(document: &WorkflowDocument) -> usize {
    let warnings = check_job_graph(document);
    for warning in &warnings {
        warn!("{}", warning);
    }
    if warnings.is_empty() {
        debug!("Job graph OK: {} jobs", document.len());
    }
    warnings.len()
}
