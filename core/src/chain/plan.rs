use super::stress::StressConfig;

/// One step of a stress chain.
///
/// The chain body walks the steps in order; nothing about what comes next is
/// captured in closures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// Run one stress round. `publish` rounds hand their response to the stress
    /// executor as a separate result as soon as they finish.
    Round {
        index: usize,
        config: StressConfig,
        publish: bool,
    },
    /// Stop the sandbox through the stop executor.
    Stop { instance_id: String },
}

/// Every round in order, each except the last published on its own, followed
/// by exactly one stop. An empty round list yields a single default round.
pub fn build_plan(instance_id: &str, rounds: Vec<StressConfig>) -> Vec<ChainStep> {
    let rounds = if rounds.is_empty() {
        vec![StressConfig::default().apply_jitter()]
    } else {
        rounds
    };
    let last = rounds.len() - 1;

    let mut steps: Vec<ChainStep> = rounds
        .into_iter()
        .enumerate()
        .map(|(index, config)| ChainStep::Round {
            index,
            config,
            publish: index < last,
        })
        .collect();
    steps.push(ChainStep::Stop {
        instance_id: instance_id.to_string(),
    });
    steps
}
