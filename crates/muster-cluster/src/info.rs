//! Tabular cluster summary.
//!
//! Produces the ordered key/value pairs consumed by a CLI or API
//! layer: strategy, filters, node count, then a block per engine in a
//! stable sort order (display name, then identity).

use std::sync::Arc;

use muster_engine::Engine;

/// Assemble the info rows.
pub(crate) fn render(
    strategy: &str,
    filters: &str,
    mut engines: Vec<Arc<Engine>>,
) -> Vec<(String, String)> {
    let mut info = vec![
        ("Strategy".to_string(), strategy.to_string()),
        ("Filters".to_string(), filters.to_string()),
        ("Nodes".to_string(), engines.len().to_string()),
    ];

    engines.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));

    for engine in engines {
        info.push((engine.name().to_string(), engine.addr().to_string()));
        info.push((
            " └ Containers".to_string(),
            engine.container_count().to_string(),
        ));
        info.push((
            " └ Reserved CPUs".to_string(),
            format!("{:.3} / {}", engine.used_cpus(), engine.total_cpus()),
        ));
        info.push((
            " └ Reserved Memory".to_string(),
            format!(
                "{} / {}",
                human_bytes(engine.used_memory() as f64),
                human_bytes(engine.total_memory() as f64)
            ),
        ));
        let mut labels: Vec<String> = engine
            .labels()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        labels.sort();
        info.push((" └ Labels".to_string(), labels.join(", ")));
    }

    info
}

/// Render a byte count with binary units, two decimals.
pub(crate) fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
