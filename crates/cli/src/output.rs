use crate::error::CliError;
use engine_core::progress::ProgressStatus;
use model::execution::{job::JobExecution, partition::PartitionContext};

pub fn print_execution(execution: &JobExecution, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(execution)?);
    } else {
        println!("{}", execution.summary());
    }
    Ok(())
}

pub fn print_progress(status: &ProgressStatus, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    let p = &status.progress;
    println!("Progress for run '{}':", status.run_id);
    println!("-----------------------------");
    println!("{:<20} {}", "Stage", status.stage);
    println!("{:<20} {}/{}", "Steps finished", p.steps_finished, p.steps_started);
    println!(
        "{:<20} {}/{} ({} failed)",
        "Partitions finished", p.partitions_finished, p.partitions_started, p.partitions_failed
    );
    println!(
        "{:<20} {} committed, {} rolled back",
        "Chunks", p.chunks_committed, p.chunks_rolled_back
    );
    println!("{:<20} {}", "Items written", p.items_written);
    println!(
        "{:<20} {}",
        "Last error",
        status.last_error.as_deref().unwrap_or("n/a")
    );
    Ok(())
}

pub fn print_partitions(partitions: &[PartitionContext]) {
    if partitions.is_empty() {
        println!("Empty key domain, no partitions");
        return;
    }
    for partition in partitions {
        println!(
            "{:<12} {:<24} {} keys",
            partition.id().label(),
            partition.range().to_string(),
            partition.range().len()
        );
    }
}
