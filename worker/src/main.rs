use std::{
    env,
    fs::File,
    io::{self, BufReader, BufWriter},
};

use log::info;
use tokio::signal;

use worker::{
    Worker, WorkerErr, build_learner,
    config::{self, CONFIG_VAR, DATA_VAR, MODEL_VAR},
};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config_path = env::var(CONFIG_VAR).map_err(|e| io::Error::other(format!("{CONFIG_VAR}: {e}")))?;
    let data_path = env::var(DATA_VAR).map_err(|e| io::Error::other(format!("{DATA_VAR}: {e}")))?;

    let spec = config::load_spec(&config_path)?;
    let examples = config::read_examples(BufReader::new(File::open(&data_path)?))?;
    info!("loaded {} examples from {data_path}", examples.len());

    let learner = build_learner(&spec.learner)?;
    let mut worker = Worker::new(spec, learner);

    tokio::select! {
        ret = worker.run(&examples) => {
            let reports = ret?;
            info!("trained {} passes, wrapping up...", reports.len());
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
            return Ok(());
        }
    }

    if let Ok(path) = env::var(MODEL_VAR) {
        let mut file = BufWriter::new(File::create(&path)?);
        worker
            .learner()
            .save(&mut file, false)
            .map_err(WorkerErr::from)?;
        info!("model saved to {path}");
    }

    Ok(())
}
