use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{DataSize, Duration, TaskInfo, TaskStatus};
use reqwest::{Client, Response, StatusCode};
use std::env;

/// URL base del worker:
/// - En Docker: WORKER_URL=http://worker:8080
/// - Local: default http://localhost:8080
fn worker_base_url() -> String {
    env::var("WORKER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "taskctl")]
#[command(about = "CLI simple para consultar las tareas de un worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lista las tareas registradas en el worker
    Tasks,
    /// Consulta el status de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Consulta status y estadísticas de una tarea
    Info {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Registra una tarea en el worker
    Create {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Aborta una tarea (o la cancela con --cancel)
    Abort {
        #[arg(value_name = "TASK_ID")]
        id: String,

        #[arg(long)]
        cancel: bool,
    },
}

/* ---------------- render ---------------- */

fn render_status(status: &TaskStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("  estado   : {:?}\n", status.state));
    out.push_str(&format!("  versión  : {}\n", status.version));
    out.push_str(&format!(
        "  drivers  : queued={}, running={}\n",
        status.queued_partitioned_drivers, status.running_partitioned_drivers
    ));
    out.push_str(&format!(
        "  memoria  : actual={}, pico_nodo={}\n",
        DataSize::from_bytes(status.memory_reservation_in_bytes),
        DataSize::from_bytes(status.peak_node_total_memory_reservation_in_bytes)
    ));
    if !status.completed_driver_groups.is_empty() {
        let groups: Vec<String> = status
            .completed_driver_groups
            .iter()
            .map(|g| g.group_id.to_string())
            .collect();
        out.push_str(&format!("  grupos   : {}\n", groups.join(", ")));
    }
    for failure in &status.failures {
        out.push_str(&format!(
            "  falla    : {} [{}] {}\n",
            failure.failure_type, failure.error_code.name, failure.message
        ));
    }
    out
}

fn render_info(info: &TaskInfo) -> String {
    let stats = &info.stats;
    let mut out = format!("Tarea {} (nodo {})\n", info.task_id, info.node_id);
    out.push_str(&format!("  heartbeat: {}\n", info.last_heartbeat));
    out.push_str(&render_status(&info.task_status));

    if !stats.create_time.is_empty() {
        out.push_str(&format!(
            "  tiempos  : inicio={}, fin={}, elapsed={}\n",
            stats.create_time,
            stats.end_time,
            Duration::from_nanos(stats.elapsed_time_in_nanos)
        ));
    }
    out.push_str(&format!(
        "  input    : raw={} filas / {}, procesado={} filas\n",
        stats.raw_input_positions,
        DataSize::from_bytes(stats.raw_input_data_size_in_bytes),
        stats.processed_input_positions
    ));
    out.push_str(&format!(
        "  output   : {} filas / {}\n",
        stats.output_positions,
        DataSize::from_bytes(stats.output_data_size_in_bytes)
    ));
    out.push_str(&format!("  pipelines: {}\n", stats.pipelines.len()));
    for (name, metric) in &stats.runtime_stats {
        out.push_str(&format!(
            "    {} = sum {}, count {}\n",
            name, metric.sum, metric.count
        ));
    }
    out
}

fn render_task_line(info: &TaskInfo) -> String {
    format!(
        "{}  {:?}  heartbeat={}",
        info.task_id, info.task_status.state, info.last_heartbeat
    )
}

/// Errores HTTP del worker como mensaje legible.
async fn check(resp: Response, id: &str) -> Result<Response> {
    match resp.status() {
        s if s.is_success() => Ok(resp),
        StatusCode::NOT_FOUND => bail!("no se encontró la tarea {id}"),
        StatusCode::BAD_REQUEST => bail!("task id inválido: {id}"),
        s => bail!("error del worker (status {s})"),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = worker_base_url();

    match cli.command {
        Commands::Tasks => {
            let url = format!("{}/v1/task", base_url);
            let resp = check(client.get(&url).send().await?, "").await?;
            let tasks: Vec<TaskInfo> = resp.json().await?;
            if tasks.is_empty() {
                println!("No hay tareas registradas.");
            } else {
                for t in &tasks {
                    println!("{}", render_task_line(t));
                }
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/v1/task/{}/status", base_url, id);
            let resp = check(client.get(&url).send().await?, &id).await?;
            let status: TaskStatus = resp.json().await?;
            println!("Tarea {}:", id);
            print!("{}", render_status(&status));
        }

        Commands::Info { id } => {
            let url = format!("{}/v1/task/{}", base_url, id);
            let resp = check(client.get(&url).send().await?, &id).await?;
            let info: TaskInfo = resp.json().await?;
            print!("{}", render_info(&info));
        }

        Commands::Create { id } => {
            let url = format!("{}/v1/task/{}", base_url, id);
            let resp = check(client.post(&url).send().await?, &id).await?;
            let info: TaskInfo = resp.json().await?;
            println!("Tarea registrada:");
            print!("{}", render_info(&info));
        }

        Commands::Abort { id, cancel } => {
            let url = format!("{}/v1/task/{}?abort={}", base_url, id, !cancel);
            let resp = check(client.delete(&url).send().await?, &id).await?;
            let info: TaskInfo = resp.json().await?;
            println!(
                "Tarea {} {}:",
                id,
                if cancel { "cancelada" } else { "abortada" }
            );
            print!("{}", render_status(&info.task_status));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExecutionFailureInfo, Lifespan, TaskId, TaskState};

    fn info() -> TaskInfo {
        let id: TaskId = "q1.0.0.3".parse().unwrap();
        let mut info = TaskInfo::new(id, "node-a");
        info.last_heartbeat = "2024-01-01T00:00:00.000Z".to_string();
        info.task_status.state = TaskState::Running;
        info.task_status.memory_reservation_in_bytes = 2048;
        info
    }

    #[test]
    fn cli_parsea_abort_con_cancel() {
        let cli = Cli::try_parse_from(["taskctl", "abort", "q.0.0.0", "--cancel"]).unwrap();
        match cli.command {
            Commands::Abort { id, cancel } => {
                assert_eq!(id, "q.0.0.0");
                assert!(cancel);
            }
            _ => panic!("se esperaba abort"),
        }
    }

    #[test]
    fn render_task_line_muestra_id_y_estado() {
        let line = render_task_line(&info());
        assert!(line.starts_with("q1.0.0.3  Running"));
    }

    #[test]
    fn render_status_incluye_grupos_y_fallas() {
        let mut status = info().task_status;
        status.completed_driver_groups.push(Lifespan {
            grouped: true,
            group_id: 4,
        });
        status.failures.push(ExecutionFailureInfo {
            failure_type: "std::exception".to_string(),
            message: "se rompió".to_string(),
            ..Default::default()
        });

        let out = render_status(&status);
        assert!(out.contains("memoria  : actual=2048B"));
        assert!(out.contains("grupos   : 4"));
        assert!(out.contains("falla    : std::exception"));
        assert!(out.contains("se rompió"));
    }

    #[test]
    fn render_info_sin_stats_omite_tiempos() {
        let out = render_info(&info());
        assert!(out.starts_with("Tarea q1.0.0.3 (nodo node-a)"));
        assert!(!out.contains("tiempos"));
        assert!(out.contains("pipelines: 0"));
    }
}
