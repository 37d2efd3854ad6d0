use anyhow::Context;
use rand::Rng;
use tracing_subscriber::EnvFilter;
use wop_optimizer::{ClientConfig, HttpTransport, OptimizationSession, PollSettings};
use wop_types::OptimizationConfig;

const DOE_SIZE: usize = 5;

/// One-dimensional Forrester function on [0, 1], minimum near x = 0.757.
fn forrester(x: f64) -> f64 {
    (6.0 * x - 2.0).powi(2) * (12.0 * x - 4.0).sin()
}

fn evaluate(batch: &[Vec<f64>]) -> Vec<Vec<f64>> {
    batch.iter().map(|x| vec![forrester(x[0])]).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = ClientConfig::from_env()?;
    let poll = PollSettings::from_env()?;
    let max_iterations: usize = match std::env::var("WOP_MAX_ITER") {
        Ok(value) => value.parse().context("WOP_MAX_ITER must be a whole number")?,
        Err(_) => 10,
    };

    tracing::info!("Optimizing the Forrester function on {}", client.base_url);

    let config = OptimizationConfig::with_bounds(vec![[0.0, 1.0]])?;
    let transport = HttpTransport::new(client)?;
    let mut session = OptimizationSession::create(transport, config)
        .await
        .context("could not create the remote optimization")?
        .with_poll_settings(poll);

    let x: Vec<Vec<f64>> = {
        let mut rng = rand::rng();
        (0..DOE_SIZE).map(|_| vec![rng.random_range(0.0..1.0)]).collect()
    };
    let y = evaluate(&x);
    session.tell_doe(x, y)?;

    let best = session.run(evaluate, max_iterations, false).await?;

    println!("status: {}", session.status());
    println!("x_opt = {:?}", best.x);
    println!("y_opt = {:?}", best.y);
    Ok(())
}
