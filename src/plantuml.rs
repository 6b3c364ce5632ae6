//! PlantUML diagram generation

use std::time::Duration;

/// One link of the transition table, already rendered to text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Row {
    pub source: String,
    pub event: String,
    pub target: String,
    /// Delayed follow-up event and its delay
    pub delayed: Option<(String, Duration)>,
}

/// Generate a PlantUML state diagram from the transition table
pub(crate) fn generate_plantuml(rows: &[Row], current_state: &str) -> String {
    let mut plantuml = String::new();
    plantuml.push_str("@startuml\n");
    plantuml.push_str("skinparam state {\n");
    plantuml.push_str("  BackgroundColor<<Current>> YellowGreen\n");
    plantuml.push_str("}\n\n");

    for row in rows {
        plantuml.push_str(&format!("{} --> {} : {}", row.source, row.target, row.event));
        if let Some((event, delay)) = &row.delayed {
            plantuml.push_str(&format!("\\nafter {:?}: {}", delay, event));
        }
        plantuml.push('\n');
    }

    // Mark current state
    plantuml.push_str(&format!("state {} <<Current>>\n", current_state));

    plantuml.push_str("@enduml\n");
    plantuml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_links_and_current_state() {
        let rows = vec![
            Row {
                source: "Open".into(),
                event: "CloseAndLock".into(),
                target: "Locked".into(),
                delayed: Some(("Unlock".into(), Duration::from_millis(100))),
            },
            Row {
                source: "Locked".into(),
                event: "Unlock".into(),
                target: "Open".into(),
                delayed: None,
            },
        ];

        let plantuml = generate_plantuml(&rows, "Locked");

        assert!(plantuml.starts_with("@startuml\n"));
        assert!(plantuml.ends_with("@enduml\n"));
        assert!(plantuml.contains("Open --> Locked : CloseAndLock\\nafter 100ms: Unlock\n"));
        assert!(plantuml.contains("Locked --> Open : Unlock\n"));
        assert!(plantuml.contains("state Locked <<Current>>\n"));
    }
}
