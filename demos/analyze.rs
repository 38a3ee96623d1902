use aclreach::{analyze, AnalysisConfig, FilterSelection, Network};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/network.acl".to_owned());
    let network = if path.ends_with(".json") {
        Network::from_json_file(&path)
    } else {
        Network::from_file(&path)
    }
    .expect("failed to load network");

    let report = analyze(&network, &FilterSelection::All, &AnalysisConfig::default())
        .expect("analysis failed");

    println!("{report}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(report.rows()).expect("rows serialize")
    );
}
