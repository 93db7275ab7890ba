use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use comms::specs::{ExampleSpec, WorkerSpec};

use crate::error::{Result, WorkerErr};

/// The variable holding the path of the worker's JSON `WorkerSpec`.
pub const CONFIG_VAR: &str = "WORKER_CONFIG";
/// The variable holding the path of the examples, one JSON `ExampleSpec` per line.
pub const DATA_VAR: &str = "WORKER_DATA";
/// The optional variable holding where to save the trained model.
pub const MODEL_VAR: &str = "WORKER_MODEL";

const MAX_NUM_BITS: u32 = 32;

/// Reads and validates the `WorkerSpec` at `path`.
///
/// # Args
/// * `path` - A JSON file.
///
/// # Returns
/// The spec or a config error naming what's wrong with it.
pub fn load_spec(path: impl AsRef<Path>) -> Result<WorkerSpec> {
    let file = File::open(path)?;
    let spec: WorkerSpec = serde_json::from_reader(BufReader::new(file))?;
    validate(&spec)?;
    Ok(spec)
}

/// Checks the bounds serde can't express.
pub fn validate(spec: &WorkerSpec) -> Result<()> {
    let invalid = |msg: String| Err(WorkerErr::Config(msg));

    if spec.passes == 0 {
        return invalid("passes must be at least 1".into());
    }

    if spec.threads == 0 || spec.ring_size == 0 {
        return invalid("threads and ring_size must be at least 1".into());
    }

    let bits = spec.learner.num_bits;
    if bits == 0 || bits > MAX_NUM_BITS {
        return invalid(format!("num_bits must be in 1..={MAX_NUM_BITS}, got {bits}"));
    }

    if let Some(node) = &spec.node
        && node.node >= node.total
    {
        return invalid(format!("node {} out of a group of {}", node.node, node.total));
    }

    Ok(())
}

/// Reads one `ExampleSpec` per non blank line.
pub fn read_examples<R: BufRead>(reader: R) -> Result<Vec<ExampleSpec>> {
    let mut examples = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let example = serde_json::from_str(&line)
            .map_err(|e| WorkerErr::Config(format!("example at line {}: {e}", i + 1)))?;
        examples.push(example);
    }

    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        let data = "{\"label\":1.0,\"namespaces\":[]}\n\n{\"namespaces\":[]}\n";
        let examples = read_examples(data.as_bytes()).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].label, Some(1.0));
        assert_eq!(examples[1].label, None);
    }

    #[test]
    fn bad_lines_are_located() {
        let err = read_examples("{\"namespaces\":[]}\nnope\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn bounds_are_checked() {
        let mut spec = WorkerSpec::default();
        assert!(validate(&spec).is_ok());

        spec.passes = 0;
        assert!(matches!(validate(&spec), Err(WorkerErr::Config(_))));

        spec.passes = 1;
        spec.node = Some(comms::specs::NodeSpec::new("m", 1, 2, 2));
        assert!(matches!(validate(&spec), Err(WorkerErr::Config(_))));
    }
}
