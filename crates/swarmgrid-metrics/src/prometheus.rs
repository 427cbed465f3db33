//! Prometheus text exposition format.
//!
//! Renders a monitoring snapshot into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use swarm_core::AgentStatus;

use crate::snapshot::MonitoringSnapshot;

/// Escape a label value: backslash, double quote and newline.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    header(out, name, help, "gauge");
    let _ = writeln!(out, "{name} {value}");
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    header(out, name, help, "counter");
    let _ = writeln!(out, "{name} {value}");
}

/// Render a monitoring snapshot into Prometheus text format.
///
/// Produces GAUGE metrics for resources, agents and tasks (with
/// `dimension`, `status` and `agent` labels) and COUNTER metrics for
/// the coordinator and ledger event counts.
pub fn render_prometheus(snapshot: &MonitoringSnapshot) -> String {
    let s = &snapshot.coordinator;
    let mut out = String::new();

    // ── Resources ─────────────────────────────────────────────────

    header(
        &mut out,
        "swarmgrid_resource_used",
        "Resource units allocated, by dimension.",
        "gauge",
    );
    for d in &s.usage.dimensions {
        let _ = writeln!(
            out,
            "swarmgrid_resource_used{{dimension=\"{}\",unit=\"{}\"}} {}",
            d.dimension.as_str(),
            d.dimension.unit(),
            d.used
        );
    }

    header(
        &mut out,
        "swarmgrid_resource_capacity",
        "Resource units available in total, by dimension.",
        "gauge",
    );
    for d in &s.usage.dimensions {
        let _ = writeln!(
            out,
            "swarmgrid_resource_capacity{{dimension=\"{}\",unit=\"{}\"}} {}",
            d.dimension.as_str(),
            d.dimension.unit(),
            d.total
        );
    }

    header(
        &mut out,
        "swarmgrid_resource_utilization",
        "Fraction of capacity allocated (0.0-1.0), by dimension.",
        "gauge",
    );
    for d in &s.usage.dimensions {
        let _ = writeln!(
            out,
            "swarmgrid_resource_utilization{{dimension=\"{}\"}} {:.4}",
            d.dimension.as_str(),
            d.utilization
        );
    }

    gauge(
        &mut out,
        "swarmgrid_utilization",
        "Bottleneck-dimension utilization (0.0-1.0).",
        format!("{:.4}", s.utilization()),
    );
    gauge(
        &mut out,
        "swarmgrid_allocations",
        "Allocations currently held.",
        s.usage.allocation_count,
    );

    // ── Agents ────────────────────────────────────────────────────

    gauge(
        &mut out,
        "swarmgrid_pool_size",
        "Live agents, draining ones included.",
        s.pool_size,
    );
    gauge(
        &mut out,
        "swarmgrid_agents_draining",
        "Agents draining before removal.",
        s.draining(),
    );

    header(
        &mut out,
        "swarmgrid_agents",
        "Live agents by status.",
        "gauge",
    );
    for status in [
        AgentStatus::Registered,
        AgentStatus::Healthy,
        AgentStatus::Degraded,
    ] {
        let n = s.agents.iter().filter(|a| a.status == status).count();
        let _ = writeln!(out, "swarmgrid_agents{{status=\"{status}\"}} {n}");
    }

    header(
        &mut out,
        "swarmgrid_agent_active_tasks",
        "Tasks in flight per agent.",
        "gauge",
    );
    for a in &s.agents {
        let _ = writeln!(
            out,
            "swarmgrid_agent_active_tasks{{agent=\"{}\"}} {}",
            escape_label(&a.id),
            a.active_tasks
        );
    }

    // ── Tasks ─────────────────────────────────────────────────────

    header(&mut out, "swarmgrid_tasks", "Tasks by status.", "gauge");
    for (status, n) in [
        ("pending", s.tasks.pending),
        ("assigned", s.tasks.assigned),
        ("running", s.tasks.running),
        ("completed", s.tasks.completed),
        ("failed", s.tasks.failed),
        ("timed_out", s.tasks.timed_out),
    ] {
        let _ = writeln!(out, "swarmgrid_tasks{{status=\"{status}\"}} {n}");
    }

    // ── Counters ──────────────────────────────────────────────────

    let c = &s.counters;
    for (name, help, value) in [
        ("swarmgrid_agents_registered_total", "Agents registered.", c.agents_registered),
        ("swarmgrid_agents_deregistered_total", "Agents deregistered.", c.agents_deregistered),
        ("swarmgrid_agent_failures_total", "Agents failed by the failure path.", c.agent_failures),
        ("swarmgrid_heartbeats_total", "Heartbeats accepted.", c.heartbeats),
        ("swarmgrid_stale_heartbeats_total", "Heartbeats from unknown or failed agents.", c.stale_heartbeats),
        ("swarmgrid_tasks_submitted_total", "Tasks submitted.", c.tasks_submitted),
        ("swarmgrid_tasks_assigned_total", "Task attempts assigned.", c.tasks_assigned),
        ("swarmgrid_tasks_completed_total", "Tasks completed.", c.tasks_completed),
        ("swarmgrid_tasks_failed_total", "Tasks permanently failed.", c.tasks_failed),
        ("swarmgrid_tasks_timed_out_total", "Tasks permanently timed out.", c.tasks_timed_out),
        ("swarmgrid_tasks_requeued_total", "Task attempts re-queued.", c.tasks_requeued),
        ("swarmgrid_rejections_no_eligible_total", "Placements rejected for lack of an eligible agent.", c.rejections_no_eligible),
        ("swarmgrid_rejections_capacity_total", "Placements rejected for lack of capacity.", c.rejections_capacity),
        ("swarmgrid_stale_reports_total", "Task reports ignored as stale.", c.stale_reports),
        ("swarmgrid_delivery_failures_total", "Assignments the driver failed to deliver.", c.delivery_failures),
        ("swarmgrid_driver_errors_total", "Agent driver start/stop errors.", c.driver_errors),
        ("swarmgrid_invariant_violations_total", "Internal invariant violations detected.", c.invariant_violations),
        ("swarmgrid_ledger_granted_total", "Ledger allocations granted.", s.ledger.granted),
        ("swarmgrid_ledger_denied_total", "Ledger allocations denied.", s.ledger.denied),
        ("swarmgrid_ledger_released_total", "Ledger allocations released.", s.ledger.released),
        ("swarmgrid_ledger_stale_releases_total", "Releases of unknown or released allocations.", s.ledger.stale_releases),
    ] {
        counter(&mut out, name, help, value);
    }

    // ── Scaling ───────────────────────────────────────────────────

    if let Some(last) = &snapshot.last_scaling {
        header(
            &mut out,
            "swarmgrid_last_scaling_timestamp_seconds",
            "Unix time of the most recent scaling action.",
            "gauge",
        );
        let _ = writeln!(
            out,
            "swarmgrid_last_scaling_timestamp_seconds{{direction=\"{}\"}} {}",
            last.direction, last.timestamp
        );
        gauge(
            &mut out,
            "swarmgrid_scaling_cooldown_until_seconds",
            "Unix time at which the last action's cooldown ends.",
            last.cooldown_until,
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swarm_core::{AgentSpec, HeartbeatStatus, ResourceVector, SwarmConfig, TaskSpec};
    use swarmgrid_coordinator::Coordinator;

    async fn busy_snapshot() -> MonitoringSnapshot {
        let config = SwarmConfig::scaffold(ResourceVector::cores(10).with_memory_mb(1024));
        let coord = Arc::new(Coordinator::standalone(config).unwrap());
        coord
            .register_agent(AgentSpec::new("a", ["build"]))
            .await
            .unwrap();
        coord
            .report_heartbeat("a", HeartbeatStatus::Healthy)
            .await
            .unwrap();
        coord
            .distribute_task(TaskSpec::new("t1", "build").with_requirements(ResourceVector::cores(4)))
            .await
            .unwrap();
        MonitoringSnapshot::collect(&coord, None).await
    }

    #[tokio::test]
    async fn render_busy_coordinator() {
        let output = render_prometheus(&busy_snapshot().await);

        assert!(output.contains("# TYPE swarmgrid_resource_used gauge"));
        assert!(output.contains("swarmgrid_resource_used{dimension=\"cpu\",unit=\"millicores\"} 4000"));
        assert!(output.contains("swarmgrid_resource_capacity{dimension=\"memory\",unit=\"mb\"} 1024"));
        assert!(output.contains("swarmgrid_resource_utilization{dimension=\"cpu\"} 0.4000"));
        assert!(output.contains("swarmgrid_utilization 0.4000"));
        assert!(output.contains("swarmgrid_agents{status=\"healthy\"} 1"));
        assert!(output.contains("swarmgrid_agent_active_tasks{agent=\"a\"} 1"));
        assert!(output.contains("swarmgrid_tasks{status=\"assigned\"} 1"));
        assert!(output.contains("# TYPE swarmgrid_tasks_submitted_total counter"));
        assert!(output.contains("swarmgrid_tasks_submitted_total 1"));
        assert!(!output.contains("swarmgrid_last_scaling_timestamp_seconds"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("plain-1"), "plain-1");
        assert_eq!(escape_label(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label(r"a\b"), r"a\\b");
        assert_eq!(escape_label("a\nb"), r"a\nb");
    }

    #[tokio::test]
    async fn odd_agent_id_keeps_exposition_intact() {
        let config = SwarmConfig::scaffold(ResourceVector::cores(4));
        let coord = Arc::new(Coordinator::standalone(config).unwrap());
        coord
            .register_agent(AgentSpec::new("evil\"} 1\nswarmgrid_fake 9", ["build"]))
            .await
            .unwrap();
        let output = render_prometheus(&MonitoringSnapshot::collect(&coord, None).await);

        assert!(output.contains(r#"swarmgrid_agent_active_tasks{agent="evil\"} 1\nswarmgrid_fake 9"} 0"#));
        assert!(!output.lines().any(|l| l.starts_with("swarmgrid_fake")));
    }

    #[tokio::test]
    async fn every_sample_has_help_and_type() {
        let output = render_prometheus(&busy_snapshot().await);

        let mut declared = std::collections::HashSet::new();
        for line in output.lines() {
            if let Some(rest) = line.strip_prefix("# TYPE ") {
                declared.insert(rest.split(' ').next().unwrap().to_string());
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let name = line.split(['{', ' ']).next().unwrap();
            assert!(declared.contains(name), "undeclared metric: {line}");
            let value = line.rsplit(' ').next().unwrap();
            assert!(value.parse::<f64>().is_ok(), "bad value: {line}");
        }
    }
}
