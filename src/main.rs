use clap::Parser;
use log::{error, info};

use pcb_eval::{run, Args};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.pred_json.exists() {
        error!(
            "The specified pred_json does not exist: {}",
            args.pred_json.display()
        );
        return;
    }

    info!("Starting the evaluation process...");

    match run(&args) {
        Ok(_) => info!("Evaluation completed successfully."),
        Err(e) => error!("Failed to evaluate detections: {}", e),
    }
}
