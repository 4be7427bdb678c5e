//! Schedule registry with load-time validation of the dependency graph.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::PipelineSchedule;
use crate::errors::{ConfigError, CycleDetectedError, ErrorInfo, ScheduleValidationError, SchedulerError};

/// In-memory map from pipeline id to its schedule.
///
/// Contents are replaced wholesale by [`ScheduleRegistry::load_schedules`] and
/// only ever published after the full set passed validation.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRegistry {
    schedules: HashMap<String, Arc<PipelineSchedule>>,
    /// Ids ordered by priority, then id.
    order: Vec<String>,
}

impl ScheduleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a list of schedules.
    ///
    /// # Errors
    ///
    /// See [`ScheduleRegistry::load_schedules`].
    pub fn from_schedules(schedules: Vec<PipelineSchedule>) -> Result<Self, SchedulerError> {
        let mut registry = Self::new();
        registry.load_schedules(schedules)?;
        Ok(registry)
    }

    /// Parses a JSON array of schedules.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON, or a validation error.
    pub fn from_json_str(json: &str) -> Result<Self, SchedulerError> {
        let schedules: Vec<PipelineSchedule> = serde_json::from_str(json).map_err(ConfigError::from)?;
        Self::from_schedules(schedules)
    }

    /// Reads a JSON array of schedules from a file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed, or a
    /// validation error.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Validates and installs a full set of schedules, replacing any existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate ids, per-schedule validation failures,
    /// unknown dependencies, or a dependency cycle. The registry is left
    /// unchanged on error.
    pub fn load_schedules(&mut self, schedules: Vec<PipelineSchedule>) -> Result<(), SchedulerError> {
        let mut map: HashMap<String, Arc<PipelineSchedule>> = HashMap::with_capacity(schedules.len());

        for schedule in schedules {
            schedule.validate()?;
            if map.contains_key(&schedule.id) {
                return Err(ScheduleValidationError::new(format!(
                    "Duplicate pipeline id '{}'",
                    schedule.id
                ))
                .with_pipelines(vec![schedule.id.clone()])
                .into());
            }
            map.insert(schedule.id.clone(), Arc::new(schedule));
        }

        for schedule in map.values() {
            for dep in &schedule.dependencies {
                if !map.contains_key(dep) {
                    return Err(ScheduleValidationError::new(format!(
                        "Pipeline '{}' depends on unknown pipeline '{}'",
                        schedule.id, dep
                    ))
                    .with_pipelines(vec![schedule.id.clone(), dep.clone()])
                    .with_error_info(
                        ErrorInfo::new("SCHEDULE-MISSING-DEP", format!("Dependency '{dep}' not found"))
                            .with_fix_hint("Register the dependency or remove it from the list."),
                    )
                    .into());
                }
            }
        }

        detect_cycles(&map)?;

        let mut order: Vec<String> = map.keys().cloned().collect();
        order.sort_by(|a, b| {
            let (sa, sb) = (&map[a], &map[b]);
            sa.priority.cmp(&sb.priority).then_with(|| a.cmp(b))
        });

        info!(pipelines = map.len(), "Loaded pipeline schedules");
        debug!(order = ?order, "Schedule priority order");

        self.schedules = map;
        self.order = order;
        Ok(())
    }

    /// Looks up a schedule by id.
    #[must_use]
    pub fn get_schedule(&self, id: &str) -> Option<Arc<PipelineSchedule>> {
        self.schedules.get(id).cloned()
    }

    /// Returns true if a schedule is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.schedules.contains_key(id)
    }

    /// Returns all schedules in priority order.
    #[must_use]
    pub fn schedules(&self) -> Vec<Arc<PipelineSchedule>> {
        self.order
            .iter()
            .filter_map(|id| self.schedules.get(id).cloned())
            .collect()
    }

    /// Returns pipeline ids in priority order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Returns the ids of schedules that list `id` as a dependency, in priority order.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|candidate| {
                self.schedules
                    .get(*candidate)
                    .is_some_and(|s| s.dependencies.iter().any(|dep| dep == id))
            })
            .cloned()
            .collect()
    }

    /// Returns the number of schedules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    /// Returns true if no schedules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

fn detect_cycles(schedules: &HashMap<String, Arc<PipelineSchedule>>) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    let mut ids: Vec<&String> = schedules.keys().collect();
    ids.sort();

    for id in ids {
        if !visited.contains(id.as_str()) {
            if let Some(cycle) = dfs_cycle(id, schedules, &mut visited, &mut rec_stack, &mut path) {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }

    Ok(())
}

fn dfs_cycle(
    node: &str,
    schedules: &HashMap<String, Arc<PipelineSchedule>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(schedule) = schedules.get(node) {
        for dep in &schedule.dependencies {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, schedules, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn chain() -> Vec<PipelineSchedule> {
        vec![
            PipelineSchedule::new("ingest", "@hourly").with_priority(1),
            PipelineSchedule::new("rollup", "0 2 * * *")
                .with_priority(2)
                .with_dependency("ingest"),
            PipelineSchedule::new("report", "0 6 * * *")
                .with_priority(3)
                .with_dependency("rollup"),
            PipelineSchedule::new("audit", "0 7 * * *")
                .with_priority(2)
                .with_dependency("ingest"),
        ]
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = ScheduleRegistry::from_schedules(chain()).unwrap();

        assert_eq!(registry.len(), 4);
        assert!(registry.get_schedule("rollup").is_some());
        assert!(registry.get_schedule("missing").is_none());
        assert_eq!(registry.ids(), ["ingest", "audit", "rollup", "report"]);
    }

    #[test]
    fn test_dependents_of() {
        let registry = ScheduleRegistry::from_schedules(chain()).unwrap();

        assert_eq!(registry.dependents_of("ingest"), vec!["audit", "rollup"]);
        assert_eq!(registry.dependents_of("rollup"), vec!["report"]);
        assert!(registry.dependents_of("report").is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let schedules = vec![
            PipelineSchedule::new("a", "@hourly"),
            PipelineSchedule::new("a", "@daily"),
        ];
        let err = ScheduleRegistry::from_schedules(schedules).unwrap_err();
        assert!(err.to_string().contains("Duplicate pipeline id 'a'"));
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let schedules = vec![PipelineSchedule::new("a", "@hourly").with_dependency("ghost")];
        let err = ScheduleRegistry::from_schedules(schedules).unwrap_err();
        assert!(err.to_string().contains("unknown pipeline 'ghost'"));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let schedules = vec![
            PipelineSchedule::new("a", "@hourly").with_dependency("c"),
            PipelineSchedule::new("b", "@hourly").with_dependency("a"),
            PipelineSchedule::new("c", "@hourly").with_dependency("b"),
        ];

        match ScheduleRegistry::from_schedules(schedules) {
            Err(SchedulerError::CycleDetected(err)) => {
                assert_eq!(err.cycle_path.first(), err.cycle_path.last());
                assert_eq!(err.cycle_path.len(), 4);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_load_leaves_registry_unchanged() {
        let mut registry = ScheduleRegistry::from_schedules(chain()).unwrap();
        let bad = vec![PipelineSchedule::new("x", "@hourly").with_dependency("y")];

        assert!(registry.load_schedules(bad).is_err());
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "cadence": "@hourly"}}, {{"id": "b", "cadence": "0 3 * * *", "dependencies": ["a"]}}]"#
        )
        .unwrap();

        let registry = ScheduleRegistry::from_json_file(file.path()).unwrap();
        assert_eq!(registry.dependents_of("a"), vec!["b"]);
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = ScheduleRegistry::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(ConfigError::Io { .. })));
    }
}
