//! Plans and job groups.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::PlanError;
use crate::job::Job;

/// Jobs that may run concurrently with each other.
#[derive(Debug, Clone, Default)]
pub struct JobGroup {
    jobs: Vec<Arc<Job>>,
}

impl JobGroup {
    pub fn new(jobs: Vec<Arc<Job>>) -> Self {
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<Arc<Job>> {
        self.jobs
    }

    pub fn names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }
}

impl From<Vec<Arc<Job>>> for JobGroup {
    fn from(jobs: Vec<Arc<Job>>) -> Self {
        Self::new(jobs)
    }
}

impl FromIterator<Arc<Job>> for JobGroup {
    fn from_iter<I: IntoIterator<Item = Arc<Job>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Ordered groups submitted together to one pipeline.
///
/// Group `n + 1` never starts before every job of group `n` has completed.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    groups: Vec<JobGroup>,
}

impl Plan {
    /// An empty plan. Scheduling it dispatches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group.
    #[must_use]
    pub fn then(mut self, group: impl Into<JobGroup>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// A plan where every job runs alone, in order.
    pub fn sequential(jobs: impl IntoIterator<Item = Arc<Job>>) -> Self {
        jobs.into_iter()
            .fold(Self::new(), |plan, job| plan.then(vec![job]))
    }

    pub fn groups(&self) -> &[JobGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<JobGroup> {
        self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total jobs across all groups.
    pub fn job_count(&self) -> usize {
        self.groups.iter().map(JobGroup::len).sum()
    }

    /// Widest group: the concurrency this plan can use.
    pub fn max_width(&self) -> usize {
        self.groups.iter().map(JobGroup::len).max().unwrap_or(0)
    }

    /// Reject empty groups and jobs listed twice in the same group.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (index, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                return Err(PlanError::EmptyGroup { index });
            }

            let mut seen = HashSet::with_capacity(group.len());
            for job in group.jobs() {
                if !seen.insert(job.id()) {
                    return Err(PlanError::DuplicateJob {
                        index,
                        name: job.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<Vec<Arc<Job>>>> for Plan {
    fn from(groups: Vec<Vec<Arc<Job>>>) -> Self {
        Self {
            groups: groups.into_iter().map(JobGroup::new).collect(),
        }
    }
}

impl From<Vec<JobGroup>> for Plan {
    fn from(groups: Vec<JobGroup>) -> Self {
        Self { groups }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn job(name: &str) -> Arc<Job> {
        Job::from_fn(name, || Ok(()))
    }

    #[test]
    fn test_builder_and_counts() {
        let plan = Plan::new()
            .then(vec![job("a"), job("b"), job("c")])
            .then(vec![job("d")]);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.job_count(), 4);
        assert_eq!(plan.max_width(), 3);
        assert_eq!(plan.groups()[1].names(), vec!["d".to_string()]);
        plan.validate().unwrap();
    }

    #[test]
    fn test_sequential() {
        let plan = Plan::sequential([job("a"), job("b")]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.max_width(), 1);
    }

    #[test]
    fn test_empty_plan_is_valid() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.max_width(), 0);
        plan.validate().unwrap();
    }

    #[rstest]
    #[case::first(vec![vec![], vec!["a"]], 0)]
    #[case::middle(vec![vec!["a"], vec![], vec!["b"]], 1)]
    #[case::last(vec![vec!["a"], vec!["b"], vec![]], 2)]
    fn test_empty_group_rejected(#[case] layout: Vec<Vec<&str>>, #[case] expected: usize) {
        let plan: Plan = layout
            .into_iter()
            .map(|names| names.into_iter().map(job).collect::<Vec<_>>())
            .collect::<Vec<_>>()
            .into();

        assert_eq!(
            plan.validate(),
            Err(PlanError::EmptyGroup { index: expected })
        );
    }

    #[test]
    fn test_same_job_twice_in_group_rejected() {
        let shared = job("shared");
        let plan = Plan::new().then(vec![shared.clone(), shared]);
        assert_eq!(
            plan.validate(),
            Err(PlanError::DuplicateJob {
                index: 0,
                name: "shared".to_string()
            })
        );
    }

    #[test]
    fn test_same_name_distinct_jobs_allowed() {
        let plan = Plan::new().then(vec![job("x"), job("x")]);
        plan.validate().unwrap();
    }

    proptest! {
        #[test]
        fn prop_counts_match_layout(widths in prop::collection::vec(1usize..6, 0..8)) {
            let plan = widths.iter().fold(Plan::new(), |plan, &width| {
                plan.then((0..width).map(|i| job(&format!("job-{i}"))).collect::<Vec<_>>())
            });

            prop_assert_eq!(plan.len(), widths.len());
            prop_assert_eq!(plan.job_count(), widths.iter().sum::<usize>());
            prop_assert_eq!(plan.max_width(), widths.iter().copied().max().unwrap_or(0));
            prop_assert!(plan.validate().is_ok());
        }
    }
}
