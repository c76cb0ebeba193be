//! `simulate` command: randomized edits and message delivery on a mesh

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tandem_core::{Mesh, Mutation, OpSetEngine, PathSegment, Result};

use crate::cli::util::{CliContext, fail, print_json};

/// Document every replica edits.
const DOC_ID: &str = "sim";

/// Map properties the simulation writes.
const KEYS: [&str; 4] = ["title", "count", "done", "owner"];

/// Outcome of one simulation run.
struct Report {
    edits: usize,
    deliveries: usize,
    duplicates: usize,
    drained: usize,
    converged: bool,
}

/// Pick a random edit valid against `view`.
fn random_mutation(rng: &mut StdRng, view: Option<&serde_json::Value>) -> Mutation {
    let key = KEYS[rng.gen_range(0..KEYS.len())];
    let items = view
        .and_then(|v| v.get("items"))
        .and_then(|v| v.as_array())
        .map(Vec::len);
    match rng.gen_range(0..4) {
        0 => Mutation::set([key], json!(rng.gen_range(0..100))),
        1 if view.and_then(|v| v.get(key)).is_some() => Mutation::delete([key]),
        1 => Mutation::set([key], json!(format!("v{}", rng.gen_range(0..10)))),
        _ => match items {
            None => Mutation::set(["items"], json!([])),
            Some(len) if len > 0 && rng.gen_bool(0.3) => Mutation::delete([
                PathSegment::from("items"),
                PathSegment::from(rng.gen_range(0..len)),
            ]),
            Some(len) => Mutation::insert(
                [PathSegment::from("items"), PathSegment::from(rng.gen_range(0..=len))],
                json!(rng.gen_range(0..1000)),
            ),
        },
    }
}

fn run(ctx: &CliContext, replicas: usize, steps: usize, seed: u64) -> Result<(Report, Mesh<OpSetEngine>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mesh = Mesh::new(Arc::clone(&ctx.engine), replicas)?;
    let mut report = Report {
        edits: 0,
        deliveries: 0,
        duplicates: 0,
        drained: 0,
        converged: false,
    };

    for _ in 0..steps {
        let pending = mesh.pending();
        if pending == 0 || rng.gen_bool(0.35) {
            let replica = rng.gen_range(0..replicas);
            let mutation = random_mutation(&mut rng, mesh.view(replica, DOC_ID));
            mesh.change(replica, DOC_ID, &[mutation])?;
            report.edits += 1;
        } else if rng.gen_bool(0.1) {
            mesh.duplicate(rng.gen_range(0..pending));
            report.duplicates += 1;
        } else {
            mesh.deliver(rng.gen_range(0..pending))?;
            report.deliveries += 1;
        }
    }

    report.drained = mesh.drain(usize::MAX)?;
    report.converged = mesh.converged(DOC_ID);
    Ok((report, mesh))
}

/// Handle the `simulate` command
pub fn handle_simulate(
    ctx: &CliContext,
    replicas: Option<usize>,
    steps: Option<usize>,
    seed: Option<u64>,
) -> bool {
    let defaults = &ctx.config.simulation;
    let replicas = replicas.unwrap_or(defaults.replicas);
    let steps = steps.unwrap_or(defaults.steps);
    let seed = seed.or(defaults.seed).unwrap_or_else(rand::random);
    if replicas < 2 {
        return fail("a simulation needs at least 2 replicas");
    }

    println!(
        "Simulating {} replicas for {} steps (seed {})",
        replicas, steps, seed
    );
    let (report, mesh) = match run(ctx, replicas, steps, seed) {
        Ok(result) => result,
        Err(e) => return fail(e),
    };
    println!(
        "  {} edits, {} deliveries, {} duplicated messages, {} drained at the end",
        report.edits, report.deliveries, report.duplicates, report.drained
    );

    if !report.converged {
        for replica in 0..replicas {
            println!("replica-{}:", replica);
            if let Some(view) = mesh.view(replica, DOC_ID) {
                print_json(view);
            }
        }
        return fail(format!("replicas diverged (seed {})", seed));
    }
    println!("✓ All replicas converged");
    if let Some(view) = mesh.view(0, DOC_ID) {
        print_json(view);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::config::Config;

    #[test]
    fn test_simulation_converges_for_several_seeds() {
        let ctx = CliContext {
            config: Config::new(std::env::temp_dir()),
            config_path: None,
            engine: Arc::new(OpSetEngine::new()),
        };
        for seed in [1, 7, 42] {
            let (report, _) = run(&ctx, 4, 120, seed).unwrap();
            assert!(report.edits > 0);
            assert!(report.converged, "seed {seed} diverged");
        }
    }
}
