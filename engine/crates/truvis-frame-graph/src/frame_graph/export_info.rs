//! 调试导出
//!
//! 把编译后的 graph 整理成 key-value 形式，供外部可视化工具使用：
//! serde 结构（可以序列化为 JSON）、graphviz dot 文本，以及日志中的执行计划。

use std::collections::BTreeMap;
use std::fmt::Write;

use itertools::Itertools;
use serde::Serialize;

use super::pass::RgPassNode;
use super::resource_handle::{RgPassId, RgResourceId};
use super::resource_registry::RgResourceRegistry;

/// 整个 graph 的导出信息
#[derive(Clone, Debug, Serialize)]
pub struct RgGraphInfo {
    /// 执行顺序（Pass 名称）
    pub execution_order: Vec<String>,
    pub passes: Vec<RgPassInfo>,
    pub resources: Vec<RgResourceInfo>,
}

/// 单个 Pass 的导出信息
#[derive(Clone, Debug, Serialize)]
pub struct RgPassInfo {
    pub id: u32,
    pub name: String,
    pub culled: bool,
    pub side_effect: bool,
    /// 以 `name@vN` 表示的资源节点
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub samples: Vec<String>,
    pub render_targets: BTreeMap<String, String>,
    pub devirtualize: Vec<String>,
    pub destroy: Vec<String>,
}

/// 单个虚拟资源的导出信息
#[derive(Clone, Debug, Serialize)]
pub struct RgResourceInfo {
    pub id: u32,
    pub name: String,
    pub version: u32,
    pub imported: bool,
    pub parent: Option<String>,
    pub refcount: u32,
    pub first: Option<String>,
    pub last: Option<String>,
    /// 描述字段
    pub attributes: BTreeMap<String, String>,
}

impl RgGraphInfo {
    pub(crate) fn collect(passes: &[RgPassNode], resources: &RgResourceRegistry, order: &[RgPassId]) -> Self {
        let pass_name = |id: RgPassId| passes[id.index()].name.clone();
        let resource_name =
            |id: RgResourceId| resources.get(id).map(|res| res.name.clone()).unwrap_or_else(|| "<unknown>".to_string());

        let pass_infos = passes
            .iter()
            .map(|pass| RgPassInfo {
                id: pass.id.raw(),
                name: pass.name.clone(),
                culled: pass.culled,
                side_effect: pass.side_effect,
                reads: pass.reads.iter().map(|&node| resources.node_label(node)).collect(),
                writes: pass.writes.iter().map(|&node| resources.node_label(node)).collect(),
                samples: pass.samples.iter().map(|&node| resources.node_label(node)).collect(),
                render_targets: pass
                    .render_targets
                    .iter()
                    .map(|(&node, att)| (att.to_string(), resources.node_label(node)))
                    .collect(),
                devirtualize: pass.devirtualize.iter().map(|&id| resource_name(id)).collect(),
                destroy: pass.destroy.iter().map(|&id| resource_name(id)).collect(),
            })
            .collect();

        let resource_infos = resources
            .iter_resources()
            .map(|res| RgResourceInfo {
                id: res.id.raw(),
                name: res.name.clone(),
                version: res.version,
                imported: res.is_imported(),
                parent: res.parent.map(resource_name),
                refcount: res.refcount,
                first: res.first.map(pass_name),
                last: res.last.map(pass_name),
                attributes: res.desc.attributes().into_iter().collect(),
            })
            .collect();

        Self {
            execution_order: order.iter().map(|&id| pass_name(id)).collect(),
            passes: pass_infos,
            resources: resource_infos,
        }
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 生成 graphviz dot 文本
///
/// Pass 画成方框，被裁剪的 Pass 用虚线；资源节点画成椭圆，外部资源填充灰色。
pub(crate) fn graphviz(passes: &[RgPassNode], resources: &RgResourceRegistry) -> String {
    let mut dot = String::new();
    // 写入 String 不会失败
    let _ = write_graphviz(&mut dot, passes, resources);
    dot
}

fn write_graphviz(out: &mut String, passes: &[RgPassNode], resources: &RgResourceRegistry) -> std::fmt::Result {
    writeln!(out, "digraph frame_graph {{")?;
    writeln!(out, "  rankdir=LR;")?;

    for pass in passes {
        let style = if pass.culled { "dashed" } else { "solid" };
        let periphery = if pass.side_effect { 2 } else { 1 };
        writeln!(
            out,
            "  p{} [label=\"{}\", shape=box, style={}, peripheries={}];",
            pass.id.raw(),
            escape(&pass.name),
            style,
            periphery
        )?;
    }

    for node in resources.iter_nodes() {
        let external = resources.is_externally_backed(node.resource);
        let style = if external { ", style=filled, fillcolor=lightgrey" } else { "" };
        writeln!(
            out,
            "  r{} [label=\"{}\", shape=ellipse{}];",
            node.id.index(),
            escape(&resources.node_label(node.id)),
            style
        )?;
    }

    for pass in passes {
        for &node in &pass.reads {
            writeln!(out, "  r{} -> p{};", node.index(), pass.id.raw())?;
        }
        for &node in &pass.writes {
            writeln!(out, "  p{} -> r{} [color=red];", pass.id.raw(), node.index())?;
        }
    }

    writeln!(out, "}}")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// 打印执行计划（用于调试）
///
/// 输出每个 Pass 的执行顺序、读写的资源节点，以及执行前后的分配 / 销毁指令。
pub(crate) fn log_execution_plan(passes: &[RgPassNode], resources: &RgResourceRegistry, order: &[RgPassId]) {
    let name_of = |id: RgResourceId| resources.get(id).map(|res| res.name.as_str()).unwrap_or("<unknown>");
    let culled = passes.iter().filter(|pass| pass.culled).map(|pass| pass.name.as_str()).collect_vec();

    log::info!("╔══════════════════════════════════════════════════════════════════╗");
    log::info!("║              FrameGraph Execution Plan                           ║");
    log::info!("╠══════════════════════════════════════════════════════════════════╣");
    log::info!(
        "║ Live Passes: {}/{}  |  Execution Order: [{}]",
        order.len(),
        passes.len(),
        order.iter().map(|id| passes[id.index()].name.as_str()).join(" → ")
    );
    if !culled.is_empty() {
        log::info!("║ Culled: [{}]", culled.join(", "));
    }
    log::info!("╚══════════════════════════════════════════════════════════════════╝");

    for (step, &pass_id) in order.iter().enumerate() {
        let pass = &passes[pass_id.index()];

        log::info!("");
        log::info!("┌─────────────────────────────────────────────────────────────────┐");
        log::info!(
            "│ [{}/{}] Pass: \"{}\"{}",
            step + 1,
            order.len(),
            pass.name,
            if pass.side_effect { " (side effect)" } else { "" }
        );
        log::info!("├─────────────────────────────────────────────────────────────────┤");

        if !pass.devirtualize.is_empty() {
            log::info!("│ Devirtualize: {}", pass.devirtualize.iter().map(|&id| name_of(id)).join(", "));
        }
        for &node in &pass.reads {
            let usage = if let Some(att) = pass.render_targets.get(&node) {
                format!(" ({})", att)
            } else if pass.samples.contains(&node) {
                " (sampled)".to_string()
            } else {
                String::new()
            };
            log::info!("│   📖 {}{}", resources.node_label(node), usage);
        }
        for &node in &pass.writes {
            log::info!("│   ✏️  {}", resources.node_label(node));
        }
        if !pass.destroy.is_empty() {
            log::info!("│ Destroy: {}", pass.destroy.iter().map(|&id| name_of(id)).join(", "));
        }

        log::info!("└─────────────────────────────────────────────────────────────────┘");
    }

    log::info!("");
    log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
}
