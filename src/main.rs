//! xdrforge: subscriber satisfaction scoring over telecom xDR sessions
//!
//! Loads session records, cleans and aggregates them per subscriber, then
//! runs the engagement / experience / satisfaction pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::time::Instant;
use xdrforge::{
    export, load_sessions, prepare_features, run_pipeline, Args, ClusterModel, PipelineConfig,
};

/// Largest k tried by the verbose elbow listing
const MAX_ELBOW_K: usize = 10;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => PipelineConfig::default(),
    };
    let config = args.apply(config);
    config.validate()?;
    let prediction = args.parse_prediction_scores()?;

    let start_time = Instant::now();

    let sessions = load_sessions(&args.input)
        .with_context(|| format!("Failed to load sessions from {}", args.input))?;
    let subscribers = prepare_features(sessions, &config)?;
    info!("Prepared {} subscribers", subscribers.len());

    let report = run_pipeline(&subscribers, &config)?;

    println!("=== Engagement Clusters ===");
    for profile in report.engagement_model.describe() {
        println!(
            "Cluster {}: {} subscribers, centroid {:?}",
            profile.label,
            profile.size,
            profile.centroid.values().to_vec()
        );
    }
    println!("\n=== Experience Clusters ===");
    for profile in report.experience_model.describe() {
        println!(
            "Cluster {}: {} subscribers, centroid {:?}",
            profile.label,
            profile.size,
            profile.centroid.values().to_vec()
        );
    }
    if args.verbose {
        let silhouette = report
            .experience_model
            .silhouette_sample(&subscribers, 100)?;
        println!("Experience silhouette score (sample): {:.3}", silhouette);

        println!("\n=== Engagement Cluster Statistics ===");
        for stats in report.engagement_model.cluster_statistics(&subscribers)? {
            println!("Cluster {} ({} subscribers):", stats.label, stats.size);
            for column in &stats.columns {
                println!(
                    "  {}: min {:.4}, max {:.4}, mean {:.4}, sum {:.4}",
                    column.column, column.min, column.max, column.mean, column.sum
                );
            }
        }

        let max_k = MAX_ELBOW_K.min(subscribers.len());
        println!("\n=== Engagement Elbow (k = 1..{}) ===", max_k);
        let curve = ClusterModel::inertia_curve(
            &subscribers,
            &config.engagement_features,
            max_k,
            &config.fit_params(),
        )?;
        for (k, inertia) in curve {
            println!("k={}: inertia {:.4}", k, inertia);
        }
    }

    println!("\n=== Top {} Satisfied Subscribers ===", report.top.len());
    for row in &report.top {
        println!(
            "{}: satisfaction {:.4} (engagement {:.4}, experience {:.4})",
            row.subscriber_id, row.satisfaction_score, row.engagement_score, row.experience_score
        );
    }

    println!("\n=== Satisfaction Regression ===");
    println!("Mean Squared Error: {:.4}", report.regression.mse);
    println!("R-squared: {:.4}", report.regression.r2);

    println!("\n=== Satisfaction Clusters ===");
    for summary in &report.cluster_summaries {
        println!(
            "Cluster {}: {} subscribers, avg satisfaction {:.4}, avg experience {:.4}",
            summary.label, summary.size, summary.mean_satisfaction, summary.mean_experience
        );
    }

    if let Some((engagement, experience)) = prediction {
        let predicted = report.predictor.predict(engagement, experience)?;
        println!("\n✓ Predicted Satisfaction Score: {:.2}", predicted);
    }

    if let Some(output) = &args.output {
        export::write_csv(&report.scores, output)
            .with_context(|| format!("Failed to write scores to {output}"))?;
        println!("\nScores saved to: {}", output);
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
