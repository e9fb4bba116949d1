//! Agregación de estadísticas: árbol del engine -> árbol del protocolo.
//!
//! Cada snapshot se reconstruye desde cero a partir de los contadores vivos
//! del engine; nunca se actualiza incrementalmente.

use std::collections::BTreeMap;

use common::{
    add_runtime_metric, CpuWallTiming, DataSize, Duration, ExecOperatorStats, ExecPipelineStats,
    ExecTaskStats, MemoryUsage, OperatorStats, PipelineStats, RuntimeCounterUnit, RuntimeMetric,
    TaskId, TaskStats,
};

use crate::translate::{to_iso_timestamp, to_operator_type, to_runtime_metric, to_timing};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Métricas acumuladas por nombre, todavía en el modelo del engine.
type MetricAcc = BTreeMap<String, RuntimeMetric>;

fn add_metric_if_not_zero(metrics: &mut MetricAcc, name: &str, value: u64) {
    if value > 0 {
        let metric = RuntimeMetric::from_value(clamp_i64(value), RuntimeCounterUnit::None);
        add_runtime_metric(metrics, name, &metric);
    }
}

fn add_to(acc: &mut u64, value: u64) {
    *acc = acc.saturating_add(value);
}

/// Suma de un campo de timing sobre las tres fases del operador.
fn phase_sum(op: &ExecOperatorStats, field: impl Fn(&CpuWallTiming) -> u64) -> u64 {
    field(&op.add_input_timing)
        .saturating_add(field(&op.get_output_timing))
        .saturating_add(field(&op.finish_timing))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_protocol_metrics(metrics: &MetricAcc) -> BTreeMap<String, common::protocol::RuntimeMetric> {
    metrics
        .iter()
        .map(|(name, metric)| (name.clone(), to_runtime_metric(name, metric)))
        .collect()
}

/// Construye las estadísticas de la tarea a partir de un snapshot del engine.
///
/// Es una función pura: con la misma entrada devuelve exactamente lo mismo.
pub fn aggregate_task_stats(
    id: &TaskId,
    exec_stats: &ExecTaskStats,
    task_memory: MemoryUsage,
    query_memory: MemoryUsage,
) -> TaskStats {
    let mut out = TaskStats {
        create_time: to_iso_timestamp(exec_stats.execution_start_time_ms),
        first_start_time: to_iso_timestamp(exec_stats.first_split_start_time_ms),
        last_start_time: to_iso_timestamp(exec_stats.last_split_start_time_ms),
        last_end_time: to_iso_timestamp(exec_stats.execution_end_time_ms),
        end_time: to_iso_timestamp(exec_stats.execution_end_time_ms),
        ..Default::default()
    };

    if exec_stats.execution_end_time_ms > exec_stats.execution_start_time_ms {
        out.elapsed_time_in_nanos = (exec_stats.execution_end_time_ms
            - exec_stats.execution_start_time_ms)
            .saturating_mul(NANOS_PER_MILLI);
    }

    // system, revocable y cumulative quedan en cero
    out.user_memory_reservation_in_bytes = task_memory.current_bytes;
    out.peak_user_memory_in_bytes = task_memory.peak_bytes;
    out.peak_total_memory_in_bytes = task_memory.peak_bytes;
    out.peak_node_total_memory_in_bytes = query_memory.peak_bytes;

    out.total_drivers = exec_stats.num_total_splits;
    out.queued_drivers = exec_stats.num_queued_splits;
    out.running_drivers = exec_stats.num_running_splits;
    out.completed_drivers = exec_stats.num_finished_splits;

    let mut task_runtime_stats = MetricAcc::new();

    if exec_stats.end_time_ms >= exec_stats.execution_end_time_ms {
        let delay_ms = exec_stats.end_time_ms - exec_stats.execution_end_time_ms;
        task_runtime_stats
            .entry("outputConsumedDelayInNanos".to_string())
            .or_default()
            .add_value(clamp_i64(delay_ms.saturating_mul(NANOS_PER_MILLI)));
        task_runtime_stats
            .entry("createTime".to_string())
            .or_default()
            .add_value(clamp_i64(exec_stats.execution_start_time_ms));
        task_runtime_stats
            .entry("endTime".to_string())
            .or_default()
            .add_value(clamp_i64(exec_stats.end_time_ms));
    }

    for (index, pipeline) in exec_stats.pipeline_stats.iter().enumerate() {
        let pipeline_out = aggregate_pipeline(id, index, pipeline, &out, &mut task_runtime_stats);

        if pipeline_out.input_pipeline {
            add_to(&mut out.raw_input_positions, pipeline_out.raw_input_positions);
            add_to(
                &mut out.raw_input_data_size_in_bytes,
                pipeline_out.raw_input_data_size_in_bytes,
            );
            add_to(&mut out.processed_input_positions, pipeline_out.processed_input_positions);
            add_to(
                &mut out.processed_input_data_size_in_bytes,
                pipeline_out.processed_input_data_size_in_bytes,
            );
        }
        if pipeline_out.output_pipeline {
            add_to(&mut out.output_positions, pipeline_out.output_positions);
            add_to(&mut out.output_data_size_in_bytes, pipeline_out.output_data_size_in_bytes);
        }

        add_to(
            &mut out.total_scheduled_time_in_nanos,
            pipeline_out.total_scheduled_time_in_nanos,
        );
        add_to(&mut out.total_cpu_time_in_nanos, pipeline_out.total_cpu_time_in_nanos);
        add_to(
            &mut out.total_blocked_time_in_nanos,
            pipeline_out.total_blocked_time_in_nanos,
        );

        out.pipelines.push(pipeline_out);
    }

    // Contadores de drivers de toda la tarea
    add_metric_if_not_zero(&mut task_runtime_stats, "drivers.total", exec_stats.num_total_drivers);
    add_metric_if_not_zero(&mut task_runtime_stats, "drivers.running", exec_stats.num_running_drivers);
    add_metric_if_not_zero(
        &mut task_runtime_stats,
        "drivers.completed",
        exec_stats.num_completed_drivers,
    );
    add_metric_if_not_zero(
        &mut task_runtime_stats,
        "drivers.terminated",
        exec_stats.num_terminated_drivers,
    );
    for (reason, count) in &exec_stats.num_blocked_drivers {
        add_metric_if_not_zero(&mut task_runtime_stats, &format!("drivers.{reason}"), *count);
    }

    out.runtime_stats = to_protocol_metrics(&task_runtime_stats);
    out
}

fn aggregate_pipeline(
    id: &TaskId,
    index: usize,
    pipeline: &ExecPipelineStats,
    task_out: &TaskStats,
    task_runtime_stats: &mut MetricAcc,
) -> PipelineStats {
    let mut out = PipelineStats {
        input_pipeline: pipeline.input_pipeline,
        output_pipeline: pipeline.output_pipeline,
        first_start_time: task_out.create_time.clone(),
        last_start_time: task_out.end_time.clone(),
        last_end_time: task_out.end_time.clone(),
        ..Default::default()
    };

    // Una tarea puede fallar antes de crear operadores.
    if let (Some(first), Some(last)) = (pipeline.operator_stats.first(), pipeline.operator_stats.last()) {
        out.pipeline_id = first.pipeline_id;
        out.total_drivers = i64::from(first.num_drivers);
        out.raw_input_positions = first.raw_input_positions;
        out.raw_input_data_size_in_bytes = first.raw_input_bytes;
        out.processed_input_positions = first.input_positions;
        out.processed_input_data_size_in_bytes = first.input_bytes;
        out.output_positions = last.output_positions;
        out.output_data_size_in_bytes = last.output_bytes;
    }

    for (position, op) in pipeline.operator_stats.iter().enumerate() {
        let op_out = aggregate_operator(id, index, position, op, pipeline, task_runtime_stats);

        add_to(&mut out.total_scheduled_time_in_nanos, phase_sum(op, |t| t.wall_nanos));
        add_to(&mut out.total_cpu_time_in_nanos, phase_sum(op, |t| t.cpu_nanos));
        add_to(&mut out.total_blocked_time_in_nanos, op.blocked_wall_nanos);

        let mem = &op.memory_stats;
        add_to(&mut out.user_memory_reservation_in_bytes, mem.user_memory_reservation);
        add_to(
            &mut out.revocable_memory_reservation_in_bytes,
            mem.revocable_memory_reservation,
        );
        add_to(&mut out.system_memory_reservation_in_bytes, mem.system_memory_reservation);

        out.operator_summaries.push(op_out);
    }

    out
}

/// El FilterProject que sigue a un TableScan reporta el raw input del scan.
fn raw_input_source<'a>(
    position: usize,
    op: &'a ExecOperatorStats,
    pipeline: &'a ExecPipelineStats,
) -> &'a ExecOperatorStats {
    if position == 1 && op.operator_type == "FilterProject" {
        if let Some(scan) = pipeline.operator_stats.first() {
            if scan.operator_type == "TableScan" {
                return scan;
            }
        }
    }
    op
}

fn aggregate_operator(
    id: &TaskId,
    pipeline_index: usize,
    position: usize,
    op: &ExecOperatorStats,
    pipeline: &ExecPipelineStats,
    task_runtime_stats: &mut MetricAcc,
) -> OperatorStats {
    let (add_input_calls, add_input_wall, add_input_cpu) = to_timing(&op.add_input_timing);
    let (get_output_calls, get_output_wall, get_output_cpu) = to_timing(&op.get_output_timing);
    let (finish_calls, finish_wall, finish_cpu) = to_timing(&op.finish_timing);

    let raw = raw_input_source(position, op, pipeline);
    let mem = &op.memory_stats;
    let input_positions = op.input_positions as f64;

    let mut out = OperatorStats {
        stage_id: id.stage_id(),
        stage_execution_id: id.stage_execution_id(),
        pipeline_id: i32::try_from(pipeline_index).unwrap_or(i32::MAX),
        operator_id: op.operator_id,
        plan_node_id: op.plan_node_id.clone(),
        operator_type: to_operator_type(&op.operator_type).to_string(),
        total_drivers: i64::from(op.num_drivers),

        add_input_calls,
        add_input_wall,
        add_input_cpu,
        raw_input_data_size: DataSize::from_bytes(raw.raw_input_bytes),
        raw_input_positions: raw.raw_input_positions,
        input_data_size: DataSize::from_bytes(op.input_bytes),
        input_positions: op.input_positions,
        sum_squared_input_positions: input_positions * input_positions,

        get_output_calls,
        get_output_wall,
        get_output_cpu,
        output_data_size: DataSize::from_bytes(op.output_bytes),
        output_positions: op.output_positions,

        blocked_wall: Duration::from_nanos(op.blocked_wall_nanos),

        finish_calls,
        finish_wall,
        finish_cpu,

        user_memory_reservation: DataSize::from_bytes(mem.user_memory_reservation),
        revocable_memory_reservation: DataSize::from_bytes(mem.revocable_memory_reservation),
        system_memory_reservation: DataSize::from_bytes(mem.system_memory_reservation),
        peak_user_memory_reservation: DataSize::from_bytes(mem.peak_user_memory_reservation),
        peak_system_memory_reservation: DataSize::from_bytes(mem.peak_system_memory_reservation),
        peak_total_memory_reservation: DataSize::from_bytes(mem.peak_total_memory_reservation),

        spilled_data_size: DataSize::from_bytes(op.spilled_bytes),

        runtime_stats: BTreeMap::new(),
    };

    // El prefijo usa el nombre nativo del operador, no el renombrado.
    let prefix = format!("{}.{}", op.operator_type, op.plan_node_id);
    let mut op_runtime_stats = MetricAcc::new();

    for (name, metric) in &op.runtime_stats {
        let stat_name = format!("{prefix}.{name}");
        add_runtime_metric(&mut op_runtime_stats, &stat_name, metric);
        add_runtime_metric(task_runtime_stats, &stat_name, metric);
    }

    if op.num_splits != 0 {
        let metric = RuntimeMetric::from_value(clamp_i64(op.num_splits), RuntimeCounterUnit::None);
        add_runtime_metric(&mut op_runtime_stats, &format!("{prefix}.numSplits"), &metric);
    }

    if op.spilled_bytes > 0 {
        let spill = [
            ("spilledBytes", op.spilled_bytes, RuntimeCounterUnit::Bytes),
            ("spilledRows", op.spilled_rows, RuntimeCounterUnit::None),
            ("spilledPartitions", op.spilled_partitions, RuntimeCounterUnit::None),
            ("spilledFiles", op.spilled_files, RuntimeCounterUnit::None),
        ];
        for (name, value, unit) in spill {
            let stat_name = format!("{prefix}.{name}");
            let metric = RuntimeMetric::from_value(clamp_i64(value), unit);
            add_runtime_metric(&mut op_runtime_stats, &stat_name, &metric);
            add_runtime_metric(task_runtime_stats, &stat_name, &metric);
        }
    }

    out.runtime_stats = to_protocol_metrics(&op_runtime_stats);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::RuntimeUnit;
    use common::{BlockingReason, CpuWallTiming};

    fn task_id() -> TaskId {
        TaskId::parse("20240101_000000_00001_abcde.3.1.0").unwrap()
    }

    fn op(pipeline_id: i32, operator_id: i32, node: &str, op_type: &str) -> ExecOperatorStats {
        ExecOperatorStats::new(pipeline_id, operator_id, node, op_type)
    }

    fn pipeline(ops: Vec<ExecOperatorStats>, input: bool, output: bool) -> ExecPipelineStats {
        ExecPipelineStats {
            operator_stats: ops,
            input_pipeline: input,
            output_pipeline: output,
        }
    }

    fn aggregate(stats: &ExecTaskStats) -> TaskStats {
        aggregate_task_stats(&task_id(), stats, MemoryUsage::default(), MemoryUsage::default())
    }

    /// Scan -> FilterProject, el scan leyó 1000 filas crudas.
    fn scan_filter_pipeline() -> ExecPipelineStats {
        let mut scan = op(0, 0, "0", "TableScan");
        scan.raw_input_positions = 1000;
        scan.raw_input_bytes = 64_000;
        scan.input_positions = 1000;
        scan.input_bytes = 32_000;
        scan.output_positions = 1000;
        scan.output_bytes = 32_000;

        let mut filter = op(0, 1, "1", "FilterProject");
        filter.input_positions = 1000;
        filter.input_bytes = 32_000;
        filter.output_positions = 400;
        filter.output_bytes = 12_800;

        pipeline(vec![scan, filter], true, true)
    }

    #[test]
    fn filter_project_tras_table_scan_hereda_raw_input() {
        let stats = ExecTaskStats {
            pipeline_stats: vec![scan_filter_pipeline()],
            ..Default::default()
        };
        let out = aggregate(&stats);

        let ops = &out.pipelines[0].operator_summaries;
        assert_eq!(ops[0].operator_type, "TableScanOperator");
        assert_eq!(ops[1].operator_type, "FilterProject");
        assert_eq!(ops[1].raw_input_positions, 1000);
        assert_eq!(ops[1].raw_input_data_size.as_bytes(), 64_000);
        assert_eq!(ops[1].input_positions, 1000);
        assert_eq!(ops[1].output_positions, 400);
    }

    #[test]
    fn filter_project_en_otra_posicion_no_hereda() {
        let mut p = scan_filter_pipeline();
        let extra = op(0, 2, "2", "FilterProject");
        p.operator_stats.push(extra);

        // el primer operador no es un scan
        let mut values = op(1, 0, "5", "Values");
        values.raw_input_positions = 7;
        let mut fp = op(1, 1, "6", "FilterProject");
        fp.raw_input_positions = 3;

        let stats = ExecTaskStats {
            pipeline_stats: vec![p, pipeline(vec![values, fp], false, false)],
            ..Default::default()
        };
        let out = aggregate(&stats);

        assert_eq!(out.pipelines[0].operator_summaries[2].raw_input_positions, 0);
        assert_eq!(out.pipelines[1].operator_summaries[1].raw_input_positions, 3);
    }

    #[test]
    fn rollup_de_input_y_output_por_pipeline() {
        let mut build_source = op(1, 0, "10", "Exchange");
        build_source.raw_input_positions = 50;
        build_source.raw_input_bytes = 500;
        build_source.input_positions = 50;
        build_source.input_bytes = 500;
        let mut build = op(1, 1, "11", "HashBuild");
        build.output_positions = 0;

        let mut partial = op(2, 0, "20", "Values");
        partial.raw_input_positions = 99;
        partial.output_positions = 99;

        let stats = ExecTaskStats {
            pipeline_stats: vec![
                scan_filter_pipeline(),
                pipeline(vec![build_source, build], true, false),
                // ni input ni output: no suma nada
                pipeline(vec![partial], false, false),
                // sin operadores
                pipeline(vec![], true, true),
            ],
            ..Default::default()
        };
        let out = aggregate(&stats);

        assert_eq!(out.raw_input_positions, 1000 + 50);
        assert_eq!(out.raw_input_data_size_in_bytes, 64_000 + 500);
        assert_eq!(out.processed_input_positions, 1000 + 50);
        assert_eq!(out.processed_input_data_size_in_bytes, 32_000 + 500);
        assert_eq!(out.output_positions, 400);
        assert_eq!(out.output_data_size_in_bytes, 12_800);

        let empty = &out.pipelines[3];
        assert!(empty.operator_summaries.is_empty());
        assert_eq!(empty.raw_input_positions, 0);
        assert_eq!(empty.output_positions, 0);

        let exchange = &out.pipelines[1].operator_summaries[0];
        assert_eq!(exchange.operator_type, "ExchangeOperator");
        assert_eq!(exchange.pipeline_id, 1);
        assert_eq!(exchange.stage_id, 3);
        assert_eq!(exchange.stage_execution_id, 1);
    }

    #[test]
    fn tiempos_y_memoria_se_acumulan() {
        let mut a = op(0, 0, "0", "TableScan");
        a.add_input_timing = CpuWallTiming::new(2, 100, 10);
        a.get_output_timing = CpuWallTiming::new(3, 200, 20);
        a.finish_timing = CpuWallTiming::new(1, 300, 30);
        a.blocked_wall_nanos = 7;
        a.memory_stats.user_memory_reservation = 1024;
        a.memory_stats.system_memory_reservation = 8;
        a.input_positions = 12;

        let mut b = op(0, 1, "1", "HashJoin");
        b.get_output_timing = CpuWallTiming::new(1, 1000, 500);
        b.blocked_wall_nanos = 3;
        b.memory_stats.user_memory_reservation = 1024;
        b.memory_stats.revocable_memory_reservation = 16;

        let stats = ExecTaskStats {
            pipeline_stats: vec![pipeline(vec![a, b], true, true)],
            ..Default::default()
        };
        let out = aggregate(&stats);
        let p = &out.pipelines[0];

        assert_eq!(p.total_scheduled_time_in_nanos, 1600);
        assert_eq!(p.total_cpu_time_in_nanos, 560);
        assert_eq!(p.total_blocked_time_in_nanos, 10);
        assert_eq!(p.user_memory_reservation_in_bytes, 2048);
        assert_eq!(p.revocable_memory_reservation_in_bytes, 16);
        assert_eq!(p.system_memory_reservation_in_bytes, 8);

        assert_eq!(out.total_scheduled_time_in_nanos, 1600);
        assert_eq!(out.total_cpu_time_in_nanos, 560);
        assert_eq!(out.total_blocked_time_in_nanos, 10);

        let scan = &p.operator_summaries[0];
        assert_eq!(scan.add_input_calls, 2);
        assert_eq!(scan.get_output_wall.as_nanos(), 200);
        assert_eq!(scan.finish_cpu.as_nanos(), 30);
        assert_eq!(scan.sum_squared_input_positions, 144.0);
        assert_eq!(p.operator_summaries[1].operator_type, "HashJoin");
    }

    #[test]
    fn spill_genera_cuatro_metricas_en_operador_y_tarea() {
        let mut agg = op(0, 0, "4", "Aggregation");
        agg.spilled_bytes = 1024;
        agg.spilled_rows = 10;
        agg.spilled_partitions = 2;
        agg.spilled_files = 3;

        let stats = ExecTaskStats {
            pipeline_stats: vec![pipeline(vec![agg], true, true)],
            ..Default::default()
        };
        let out = aggregate(&stats);
        let op_out = &out.pipelines[0].operator_summaries[0];

        for map in [&op_out.runtime_stats, &out.runtime_stats] {
            let bytes = &map["Aggregation.4.spilledBytes"];
            assert_eq!(bytes.sum, 1024);
            assert_eq!(bytes.count, 1);
            assert_eq!(bytes.unit, RuntimeUnit::Byte);
            assert_eq!(map["Aggregation.4.spilledRows"].sum, 10);
            assert_eq!(map["Aggregation.4.spilledPartitions"].sum, 2);
            assert_eq!(map["Aggregation.4.spilledFiles"].sum, 3);
        }
        assert_eq!(op_out.spilled_data_size.as_bytes(), 1024);
    }

    #[test]
    fn sin_spill_no_hay_metricas_de_spill() {
        let mut agg = op(0, 0, "4", "Aggregation");
        agg.spilled_rows = 10;

        let stats = ExecTaskStats {
            pipeline_stats: vec![pipeline(vec![agg], true, true)],
            ..Default::default()
        };
        let out = aggregate(&stats);
        assert!(out.runtime_stats.keys().all(|k| !k.contains("spilled")));
    }

    #[test]
    fn metricas_del_operador_se_prefijan_y_mergean_en_la_tarea() {
        let mut a = op(0, 0, "7", "TableScan");
        a.runtime_stats.insert(
            "ioWaitNanos".to_string(),
            RuntimeMetric::from_value(100, RuntimeCounterUnit::Nanos),
        );
        a.num_splits = 4;

        // mismo tipo y plan node en otro pipeline: se mergea en la tarea
        let mut b = op(1, 0, "7", "TableScan");
        b.runtime_stats.insert(
            "ioWaitNanos".to_string(),
            RuntimeMetric::from_value(300, RuntimeCounterUnit::Nanos),
        );

        let stats = ExecTaskStats {
            pipeline_stats: vec![pipeline(vec![a], true, false), pipeline(vec![b], true, false)],
            ..Default::default()
        };
        let out = aggregate(&stats);

        let op_a = &out.pipelines[0].operator_summaries[0];
        let io = &op_a.runtime_stats["TableScan.7.ioWaitNanos"];
        assert_eq!((io.sum, io.count), (100, 1));
        assert_eq!(io.unit, RuntimeUnit::Nano);
        assert_eq!(op_a.runtime_stats["TableScan.7.numSplits"].sum, 4);

        let task_io = &out.runtime_stats["TableScan.7.ioWaitNanos"];
        assert_eq!((task_io.sum, task_io.count, task_io.min, task_io.max), (400, 2, 100, 300));
        // numSplits solo va al operador
        assert!(!out.runtime_stats.contains_key("TableScan.7.numSplits"));
        assert!(!out.pipelines[1].operator_summaries[0]
            .runtime_stats
            .contains_key("TableScan.7.numSplits"));
    }

    #[test]
    fn metricas_de_drivers_solo_si_no_son_cero() {
        let mut blocked = BTreeMap::new();
        blocked.insert(BlockingReason::WaitForMemory, 3);
        blocked.insert(BlockingReason::WaitForSplit, 0);

        let stats = ExecTaskStats {
            num_total_drivers: 8,
            num_running_drivers: 0,
            num_completed_drivers: 5,
            num_terminated_drivers: 0,
            num_blocked_drivers: blocked,
            ..Default::default()
        };
        let out = aggregate(&stats);

        assert_eq!(out.runtime_stats["drivers.total"].sum, 8);
        assert_eq!(out.runtime_stats["drivers.completed"].sum, 5);
        assert_eq!(out.runtime_stats["drivers.WaitForMemory"].sum, 3);
        assert!(!out.runtime_stats.contains_key("drivers.running"));
        assert!(!out.runtime_stats.contains_key("drivers.terminated"));
        assert!(!out.runtime_stats.contains_key("drivers.WaitForSplit"));
    }

    #[test]
    fn tiempos_de_la_tarea_y_output_consumed_delay() {
        let stats = ExecTaskStats {
            execution_start_time_ms: 1_000,
            first_split_start_time_ms: 1_010,
            last_split_start_time_ms: 1_020,
            execution_end_time_ms: 1_500,
            end_time_ms: 1_700,
            num_total_splits: 4,
            num_finished_splits: 3,
            num_running_splits: 1,
            ..Default::default()
        };
        let out = aggregate(&stats);

        assert_eq!(out.elapsed_time_in_nanos, 500 * 1_000_000);
        assert_eq!(out.create_time, "1970-01-01T00:00:01.000Z");
        assert_eq!(out.first_start_time, "1970-01-01T00:00:01.010Z");
        assert_eq!(out.end_time, "1970-01-01T00:00:01.500Z");
        assert_eq!(out.total_drivers, 4);
        assert_eq!(out.completed_drivers, 3);
        assert_eq!(out.running_drivers, 1);

        assert_eq!(out.runtime_stats["outputConsumedDelayInNanos"].sum, 200 * 1_000_000);
        assert_eq!(out.runtime_stats["createTime"].sum, 1_000);
        assert_eq!(out.runtime_stats["endTime"].sum, 1_700);
    }

    #[test]
    fn sin_fin_de_ejecucion_no_hay_elapsed_ni_delay() {
        // ejecución terminó pero el consumidor todavía no (end < execution end)
        let stats = ExecTaskStats {
            execution_start_time_ms: 2_000,
            execution_end_time_ms: 2_500,
            end_time_ms: 0,
            ..Default::default()
        };
        let out = aggregate(&stats);
        assert_eq!(out.elapsed_time_in_nanos, 500 * 1_000_000);
        assert!(!out.runtime_stats.contains_key("outputConsumedDelayInNanos"));
        assert!(!out.runtime_stats.contains_key("createTime"));

        // end <= start: elapsed cero
        let stats = ExecTaskStats {
            execution_start_time_ms: 2_000,
            execution_end_time_ms: 0,
            ..Default::default()
        };
        assert_eq!(aggregate(&stats).elapsed_time_in_nanos, 0);
    }

    #[test]
    fn memoria_de_la_tarea_y_de_la_query() {
        let stats = ExecTaskStats::default();
        let out = aggregate_task_stats(
            &task_id(),
            &stats,
            MemoryUsage {
                current_bytes: 100,
                peak_bytes: 300,
            },
            MemoryUsage {
                current_bytes: 1_000,
                peak_bytes: 5_000,
            },
        );
        assert_eq!(out.user_memory_reservation_in_bytes, 100);
        assert_eq!(out.peak_user_memory_in_bytes, 300);
        assert_eq!(out.peak_total_memory_in_bytes, 300);
        assert_eq!(out.peak_node_total_memory_in_bytes, 5_000);
        assert_eq!(out.system_memory_reservation_in_bytes, 0);
        assert_eq!(out.revocable_memory_reservation_in_bytes, 0);
        assert_eq!(out.cumulative_user_memory, 0.0);
    }

    #[test]
    fn agregar_dos_veces_da_lo_mismo() {
        let mut p = scan_filter_pipeline();
        for (i, o) in p.operator_stats.iter_mut().enumerate() {
            for k in 0..5 {
                o.runtime_stats.insert(
                    format!("m{k}"),
                    RuntimeMetric::from_value((i * 10 + k) as i64, RuntimeCounterUnit::None),
                );
            }
        }
        let stats = ExecTaskStats {
            pipeline_stats: vec![p],
            num_total_drivers: 2,
            ..Default::default()
        };

        let first = serde_json::to_string(&aggregate(&stats)).unwrap();
        let second = serde_json::to_string(&aggregate(&stats)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn contadores_enormes_saturan_en_vez_de_desbordar() {
        let mut a = op(0, 0, "0", "TableScan");
        a.raw_input_positions = u64::MAX;
        a.add_input_timing = CpuWallTiming::new(1, u64::MAX, u64::MAX);
        a.get_output_timing = CpuWallTiming::new(1, 10, 10);
        a.blocked_wall_nanos = u64::MAX;
        a.memory_stats.user_memory_reservation = u64::MAX;
        let mut b = op(0, 1, "1", "HashJoin");
        b.memory_stats.user_memory_reservation = 1;
        b.blocked_wall_nanos = 1;
        let mut c = op(1, 0, "2", "TableScan");
        c.raw_input_positions = 5;

        let stats = ExecTaskStats {
            pipeline_stats: vec![
                pipeline(vec![a, b], true, false),
                pipeline(vec![c], true, true),
            ],
            ..Default::default()
        };
        let out = aggregate(&stats);

        assert_eq!(out.raw_input_positions, u64::MAX);
        assert_eq!(out.total_scheduled_time_in_nanos, u64::MAX);
        assert_eq!(out.total_cpu_time_in_nanos, u64::MAX);
        assert_eq!(out.total_blocked_time_in_nanos, u64::MAX);
        assert_eq!(out.pipelines[0].user_memory_reservation_in_bytes, u64::MAX);
    }
}
