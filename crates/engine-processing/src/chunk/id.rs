use model::core::identifiers::{PartitionId, RunId};

/// Stable id of the `seq`-th chunk of a step execution: a replayed chunk gets
/// the same id, so sinks can deduplicate on it.
pub fn make_chunk_id(run_id: &RunId, step: &str, partition: Option<PartitionId>, seq: u64) -> String {
    let mut h = blake3::Hasher::new();
    h.update(run_id.as_str().as_bytes());
    h.update(&[0]);
    h.update(step.as_bytes());
    h.update(&[0]);
    if let Some(p) = partition {
        h.update(&(p.index() as u64).to_be_bytes());
    }
    h.update(&seq.to_be_bytes());
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_distinct() {
        let run = RunId::new("run-1");
        let a = make_chunk_id(&run, "load", None, 0);
        assert_eq!(a, make_chunk_id(&run, "load", None, 0));
        assert_ne!(a, make_chunk_id(&run, "load", None, 1));
        assert_ne!(a, make_chunk_id(&run, "load", Some(PartitionId(0)), 0));
        assert_ne!(a, make_chunk_id(&RunId::new("run-2"), "load", None, 0));
    }
}
