//! Execution plan
//!
//! Validated view of a pipeline's stage graph: a deterministic topological
//! order plus dependency and dependent lookups used by the scheduler.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::domain::pipeline::PipelineSpec;
use crate::error::ConfigurationError;

/// Topologically ordered stage graph
///
/// Every stage appears in `order` after all of its dependencies. Ties are
/// broken by declaration order so the same definition always yields the
/// same plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<String>,
    needs: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl ExecutionPlan {
    /// Validates `spec` and builds its plan using Kahn's algorithm
    pub fn build(spec: &PipelineSpec) -> Result<Self, ConfigurationError> {
        if spec.stages.is_empty() {
            return Err(ConfigurationError::EmptyPipeline(spec.name.clone()));
        }

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(spec.stages.len());
        for (idx, stage) in spec.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ConfigurationError::EmptyStageName);
            }
            if index.insert(stage.name.as_str(), idx).is_some() {
                return Err(ConfigurationError::DuplicateStage(stage.name.clone()));
            }
            if stage.actions.is_empty() && stage.deploy.is_none() {
                return Err(ConfigurationError::EmptyStage(stage.name.clone()));
            }
            if let Some(deploy) = &stage.deploy {
                deploy
                    .validate()
                    .map_err(|reason| ConfigurationError::InvalidDeploy {
                        stage: stage.name.clone(),
                        reason,
                    })?;
            }
        }

        // Deduplicated upstream indices per stage
        let mut upstream: Vec<Vec<usize>> = Vec::with_capacity(spec.stages.len());
        for stage in &spec.stages {
            let mut deps = Vec::new();
            for dep in &stage.needs {
                if dep == &stage.name {
                    return Err(ConfigurationError::SelfDependency(stage.name.clone()));
                }
                let dep_idx = *index.get(dep.as_str()).ok_or_else(|| {
                    ConfigurationError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if !deps.contains(&dep_idx) {
                    deps.push(dep_idx);
                }
            }
            upstream.push(deps);
        }

        let count = spec.stages.len();
        let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (idx, deps) in upstream.iter().enumerate() {
            for &dep in deps {
                downstream[dep].push(idx);
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &next in &downstream[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < count {
            let path = find_cycle(&upstream, &in_degree)
                .into_iter()
                .map(|i| spec.stages[i].name.clone())
                .collect();
            return Err(ConfigurationError::Cycle { path });
        }

        let name = |i: usize| spec.stages[i].name.clone();
        Ok(Self {
            order: order.into_iter().map(name).collect(),
            needs: upstream
                .iter()
                .enumerate()
                .map(|(i, deps)| (name(i), deps.iter().map(|&d| name(d)).collect()))
                .collect(),
            dependents: downstream
                .iter()
                .enumerate()
                .map(|(i, deps)| (name(i), deps.iter().map(|&d| name(d)).collect()))
                .collect(),
        })
    }

    /// Stage names in execution order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Number of stages in the plan
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct upstream stages of `stage`
    pub fn dependencies(&self, stage: &str) -> &[String] {
        self.needs.get(stage).map(Vec::as_slice).unwrap_or_default()
    }

    /// Direct downstream stages of `stage`
    pub fn dependents(&self, stage: &str) -> &[String] {
        self.dependents
            .get(stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every stage that transitively depends on `stage`, in execution order
    pub fn downstream(&self, stage: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([stage]);

        while let Some(current) = queue.pop_front() {
            for next in self.dependents(current) {
                if seen.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }

        self.order
            .iter()
            .filter(|name| seen.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Position of `stage` in the execution order
    pub fn position(&self, stage: &str) -> Option<usize> {
        self.order.iter().position(|s| s == stage)
    }
}

/// Extracts one concrete cycle among the stages Kahn's algorithm could not order
///
/// Every remaining stage still has an unprocessed dependency, so walking
/// dependencies from any of them must revisit a stage.
fn find_cycle(upstream: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let remaining = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..upstream.len()).find(|&i| remaining(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = upstream[current].iter().find(|&&d| remaining(d)) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{ActionSpec, StageSpec};

    fn stage(name: &str, needs: &[&str]) -> StageSpec {
        let mut stage = StageSpec::new(name).action(ActionSpec::shell("true"));
        for dep in needs {
            stage = stage.needs(*dep);
        }
        stage
    }

    fn spec(stages: Vec<StageSpec>) -> PipelineSpec {
        PipelineSpec {
            name: "test".to_string(),
            description: None,
            stages,
        }
    }

    fn assert_respects_dependencies(spec: &PipelineSpec, plan: &ExecutionPlan) {
        assert_eq!(plan.len(), spec.stages.len());
        for stage in &spec.stages {
            let pos = plan.position(&stage.name).unwrap();
            for dep in &stage.needs {
                assert!(
                    plan.position(dep).unwrap() < pos,
                    "{} must run after {}",
                    stage.name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_linear_pipeline_order() {
        let spec = spec(vec![
            stage("deploy", &["build"]),
            stage("build", &["test"]),
            stage("test", &[]),
        ]);
        let plan = spec.plan().unwrap();
        assert_eq!(plan.order(), ["test", "build", "deploy"]);
    }

    #[test]
    fn test_diamond_order_breaks_ties_by_declaration() {
        let spec = spec(vec![
            stage("checkout", &[]),
            stage("lint", &["checkout"]),
            stage("unit", &["checkout"]),
            stage("package", &["lint", "unit"]),
        ]);
        let plan = spec.plan().unwrap();
        assert_eq!(plan.order(), ["checkout", "lint", "unit", "package"]);
        assert_eq!(plan.dependencies("package"), ["lint", "unit"]);
        assert_eq!(plan.dependents("checkout"), ["lint", "unit"]);
    }

    #[test]
    fn test_duplicate_needs_are_collapsed() {
        let spec = spec(vec![stage("a", &[]), stage("b", &["a", "a"])]);
        let plan = spec.plan().unwrap();
        assert_eq!(plan.dependencies("b"), ["a"]);
    }

    #[test]
    fn test_generated_dags_respect_dependencies() {
        // xorshift keeps the generated graphs deterministic
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for size in 1..25usize {
            let mut stages = Vec::new();
            for i in 0..size {
                let mut s = stage(&format!("s{}", i), &[]);
                for j in 0..i {
                    if next() % 3 == 0 {
                        s = s.needs(format!("s{}", j));
                    }
                }
                stages.push(s);
            }
            // Shuffle declaration order
            for i in (1..stages.len()).rev() {
                let j = (next() as usize) % (i + 1);
                stages.swap(i, j);
            }
            let spec = spec(stages);
            let plan = spec.plan().unwrap();
            assert_respects_dependencies(&spec, &plan);
        }
    }

    #[test]
    fn test_two_stage_cycle_is_rejected() {
        let spec = spec(vec![stage("a", &["b"]), stage("b", &["a"])]);
        let err = spec.plan().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Cycle {
                path: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn test_cycle_behind_valid_prefix_is_reported() {
        let spec = spec(vec![
            stage("setup", &[]),
            stage("x", &["setup", "z"]),
            stage("y", &["x"]),
            stage("z", &["y"]),
        ]);
        match spec.plan().unwrap_err() {
            ConfigurationError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
                assert!(!path.contains(&"setup".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let spec = spec(vec![stage("a", &["a"])]);
        assert_eq!(
            spec.plan().unwrap_err(),
            ConfigurationError::SelfDependency("a".to_string())
        );
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let spec = spec(vec![stage("build", &["test"])]);
        assert_eq!(
            spec.plan().unwrap_err(),
            ConfigurationError::UnknownDependency {
                stage: "build".to_string(),
                dependency: "test".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let spec = spec(vec![stage("a", &[]), stage("a", &[])]);
        assert_eq!(
            spec.plan().unwrap_err(),
            ConfigurationError::DuplicateStage("a".to_string())
        );
    }

    #[test]
    fn test_empty_pipeline_and_empty_stage_are_rejected() {
        assert!(matches!(
            spec(vec![]).plan(),
            Err(ConfigurationError::EmptyPipeline(_))
        ));
        assert!(matches!(
            spec(vec![StageSpec::new("noop")]).plan(),
            Err(ConfigurationError::EmptyStage(_))
        ));
    }

    #[test]
    fn test_downstream_is_transitive() {
        let spec = spec(vec![
            stage("test", &[]),
            stage("build", &["test"]),
            stage("docs", &[]),
            stage("deploy", &["build"]),
            stage("smoke", &["deploy", "docs"]),
        ]);
        let plan = spec.plan().unwrap();
        assert_eq!(plan.downstream("test"), ["build", "deploy", "smoke"]);
        assert_eq!(plan.downstream("docs"), ["smoke"]);
        assert!(plan.downstream("smoke").is_empty());
    }
}
