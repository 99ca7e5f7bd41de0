//! FrameGraph 编译
//!
//! 1. 根据 Pass 的读写集合构建依赖图
//! 2. 检查 single-writer 与循环依赖
//! 3. 从有副作用的 Pass 反向回溯，裁剪无用的 Pass
//! 4. 对存活的 Pass 排序
//! 5. 计算资源生命周期，生成 devirtualize / destroy 指令

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::IndexSet;
use itertools::Itertools;

use super::error::{RgError, RgResult};
use super::graph::{DependencyGraph, RgNodeKind};
use super::options::RgCompileOptions;
use super::pass::RgPassNode;
use super::resource_handle::{RgPassId, RgResourceId};
use super::resource_registry::RgResourceRegistry;

/// 编译产物中与 Pass 列表分开保存的部分
pub(crate) struct RgCompileOutput {
    pub graph: DependencyGraph,
    pub execution_order: Vec<RgPassId>,
}

/// 编译整个 graph
///
/// Pass 的 `culled` / `devirtualize` / `destroy` 以及资源的 `refcount` / `first` / `last` 在此填写。
pub(crate) fn compile_graph(
    passes: &mut [RgPassNode],
    resources: &mut RgResourceRegistry,
    rejected: &[RgError],
    options: &RgCompileOptions,
) -> RgResult<RgCompileOutput> {
    profile_scope!("FrameGraph::compile");

    if options.strict_imported_usage {
        check_rejected(rejected)?;
    }

    let graph = build_graph(passes, resources);
    if options.validate_single_writer {
        validate_single_writer(&graph, resources)?;
    }
    check_acyclic(&graph, passes, resources)?;

    cull_passes(&graph, passes, options.cull_passes);
    let execution_order = schedule(&graph, passes, resources)?;
    compute_lifetimes(passes, resources, &execution_order);

    log::debug!(
        "frame graph compiled: {} of {} passes live, order [{}]",
        execution_order.len(),
        passes.len(),
        execution_order.iter().map(|id| passes[id.index()].name.as_str()).join(", ")
    );

    Ok(RgCompileOutput { graph, execution_order })
}

/// 严格模式：外部渲染目标的非法连接使整帧编译失败
fn check_rejected(rejected: &[RgError]) -> RgResult<()> {
    let illegal = rejected.iter().filter(|err| matches!(err, RgError::IllegalImportedUsage { .. })).collect_vec();
    match illegal.first() {
        Some(&first) => {
            let err = RgError::RejectedDeclarations {
                count: illegal.len(),
                first: Box::new(first.clone()),
            };
            log::error!("{}", err);
            Err(err)
        }
        None => Ok(()),
    }
}

/// 读集合产生读边，写集合产生写边
fn build_graph(passes: &[RgPassNode], resources: &RgResourceRegistry) -> DependencyGraph {
    let mut graph = DependencyGraph::new(passes.len(), resources.node_count());
    for pass in passes {
        for &node in &pass.reads {
            graph.add_read_edge(node, pass.id);
        }
        for &node in &pass.writes {
            graph.add_write_edge(pass.id, node);
        }
    }
    graph
}

fn validate_single_writer(graph: &DependencyGraph, resources: &RgResourceRegistry) -> RgResult<()> {
    for node in resources.iter_nodes() {
        let writers = graph.writer_count(node.id);
        debug_assert!(writers <= 1 || node.writer.is_some());
        if writers > 1 {
            let err = RgError::MultipleWriters {
                resource: resources.node_label(node.id),
                writers,
            };
            log::error!("{}", err);
            return Err(err);
        }
    }
    Ok(())
}

fn check_acyclic(graph: &DependencyGraph, passes: &[RgPassNode], resources: &RgResourceRegistry) -> RgResult<()> {
    let Some(cycle) = graph.find_cycle() else {
        return Ok(());
    };

    let mut cycle_passes = Vec::new();
    let mut cycle_resources = Vec::new();
    for node in cycle {
        match node {
            RgNodeKind::Pass(pass) => cycle_passes.push(passes[pass.index()].name.clone()),
            RgNodeKind::Resource(resource) => cycle_resources.push(resources.node_label(resource)),
        }
    }

    let err = RgError::Cycle {
        passes: cycle_passes,
        resources: cycle_resources,
    };
    log::error!("{}", err);
    Err(err)
}

/// 有副作用的 Pass 是根，沿入边回溯能到达的 Pass 存活，其余的被裁剪
fn cull_passes(graph: &DependencyGraph, passes: &mut [RgPassNode], enabled: bool) {
    let roots = passes.iter().filter(|pass| !enabled || pass.side_effect).map(|pass| pass.id).collect_vec();
    let live = graph.live_passes(roots);

    for pass in passes.iter_mut() {
        pass.culled = !live[pass.id.index()];
        if pass.culled {
            log::debug!("cull pass \"{}\"", pass.name);
        }
    }
}

/// 对存活的 Pass 排序
///
/// 同一个资源的各个版本共享一份物理资源，因此除了写后读之外，
/// 还要保证读取旧版本的 Pass 在下一个写入者之前，写入者之间保持版本顺序。
/// 满足约束的前提下按声明顺序执行。
fn schedule(graph: &DependencyGraph, passes: &[RgPassNode], resources: &RgResourceRegistry) -> RgResult<Vec<RgPassId>> {
    let is_live = |pass: RgPassId| !passes[pass.index()].culled;

    let mut successors: Vec<IndexSet<usize>> = vec![IndexSet::new(); passes.len()];
    let mut in_degree = vec![0usize; passes.len()];
    let mut add_constraint = |before: RgPassId, after: RgPassId| {
        if before != after && successors[before.index()].insert(after.index()) {
            in_degree[after.index()] += 1;
        }
    };

    for resource in resources.iter_resources() {
        let mut last_writer: Option<RgPassId> = None;
        let mut pending_readers: Vec<RgPassId> = Vec::new();

        for &node_id in resource.version_nodes() {
            let node = resources.node(node_id);

            if let Some(writer) = node.writer.filter(|&w| is_live(w)) {
                // 读旧版本的 Pass 先于覆盖它的写入者
                for &reader in &pending_readers {
                    add_constraint(reader, writer);
                }
                if let Some(prev) = last_writer {
                    add_constraint(prev, writer);
                }
                pending_readers.clear();
                last_writer = Some(writer);
            }

            for reader in graph.readers(node_id).filter(|&r| is_live(r)) {
                if let Some(writer) = node.writer {
                    add_constraint(writer, reader);
                }
                pending_readers.push(reader);
            }
        }
    }

    let live_count = passes.iter().filter(|pass| !pass.culled).count();
    let mut ready: BinaryHeap<Reverse<usize>> = passes
        .iter()
        .filter(|pass| !pass.culled && in_degree[pass.id.index()] == 0)
        .map(|pass| Reverse(pass.id.index()))
        .collect();
    let mut order = Vec::with_capacity(live_count);

    while let Some(Reverse(index)) = ready.pop() {
        order.push(passes[index].id);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != live_count {
        let stuck = passes
            .iter()
            .filter(|pass| !pass.culled && in_degree[pass.id.index()] > 0)
            .map(|pass| pass.name.clone())
            .collect_vec();
        let err = RgError::Cycle {
            passes: stuck,
            resources: Vec::new(),
        };
        log::error!("passes cannot be ordered: {}", err);
        return Err(err);
    }

    Ok(order)
}

/// 计算生命周期并生成 devirtualize / destroy 指令
///
/// Pass 涉及的资源连同其所有祖先一起计数（祖先在前），
/// 因此父资源总是先于子资源分配、晚于子资源销毁。
/// 外部资源（或外部资源的子资源）不生成任何指令。
fn compute_lifetimes(passes: &mut [RgPassNode], resources: &mut RgResourceRegistry, order: &[RgPassId]) {
    for resource in resources.iter_resources_mut() {
        resource.reset_lifetime();
    }
    for pass in passes.iter_mut() {
        pass.devirtualize.clear();
        pass.destroy.clear();
    }

    let mut touched_per_pass: Vec<IndexSet<RgResourceId>> = Vec::with_capacity(order.len());
    for &pass_id in order {
        let mut touched = IndexSet::new();
        for id in passes[pass_id.index()].declared_resources() {
            let chain = resources.ancestors(id).collect_vec();
            touched.extend(chain.into_iter().rev());
        }

        for &id in &touched {
            let external = resources.is_externally_backed(id);
            let resource = resources.resource_mut(id);
            resource.refcount += 1;
            resource.last = Some(pass_id);
            if resource.first.is_none() {
                resource.first = Some(pass_id);
                if !external {
                    passes[pass_id.index()].devirtualize.push(id);
                }
            }
        }
        touched_per_pass.push(touched);
    }

    for (&pass_id, touched) in order.iter().zip(&touched_per_pass) {
        for &id in touched.iter().rev() {
            let Some(resource) = resources.get(id) else { continue };
            if resource.last == Some(pass_id) && !resources.is_externally_backed(id) {
                passes[pass_id.index()].destroy.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::resource_desc::{RgBufferDesc, RgBufferUsage};
    use crate::frame_graph::resource_handle::RgRawHandle;

    struct Setup {
        passes: Vec<RgPassNode>,
        resources: RgResourceRegistry,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                passes: Vec::new(),
                resources: RgResourceRegistry::new(),
            }
        }

        fn buffer(&mut self, name: &str) -> RgRawHandle {
            self.resources.register(name, RgBufferDesc::new(64, RgBufferUsage::STORAGE).into(), None, None).unwrap()
        }

        fn pass(&mut self, name: &str) -> RgPassId {
            let id = RgPassId(self.passes.len() as u32);
            self.passes.push(RgPassNode::new(name.to_string(), id));
            id
        }

        fn write(&mut self, pass: RgPassId, raw: RgRawHandle) -> RgRawHandle {
            let (post, node) = self.resources.bump_version(raw.id(), pass);
            let pass = &mut self.passes[pass.index()];
            pass.writes.insert(node);
            pass.declared.insert(raw.id());
            post
        }

        fn read(&mut self, pass: RgPassId, raw: RgRawHandle) {
            let node = self.resources.resource(raw.id()).unwrap().node_of_version(raw.version()).unwrap();
            let pass = &mut self.passes[pass.index()];
            pass.reads.insert(node);
            pass.declared.insert(raw.id());
        }

        fn compile(&mut self) -> RgResult<RgCompileOutput> {
            compile_graph(&mut self.passes, &mut self.resources, &[], &RgCompileOptions::default())
        }
    }

    #[test]
    fn test_write_after_read_keeps_reader_first() {
        // reader 读 v1，之后声明的 overwrite 写 v2；两者都被最终的 present 需要
        let mut s = Setup::new();
        let r = s.buffer("r");
        let producer = s.pass("producer");
        let reader = s.pass("reader");
        let overwrite = s.pass("overwrite");
        let present = s.pass("present");

        let v1 = s.write(producer, r);
        s.read(reader, v1);
        let out = s.buffer("out");
        let out1 = s.write(reader, out);
        let v2 = s.write(overwrite, v1);
        s.read(present, v2);
        s.read(present, out1);
        s.passes[present.index()].side_effect = true;

        let output = s.compile().unwrap();
        assert_eq!(output.execution_order, vec![producer, reader, overwrite, present]);

        let res = s.resources.resource(r.id()).unwrap();
        assert_eq!(res.lifetime(), Some((producer, present)));
        assert_eq!(res.refcount, 4);
        assert_eq!(s.passes[producer.index()].devirtualize, vec![r.id()]);
        assert_eq!(s.passes[present.index()].destroy, vec![out.id(), r.id()]);
    }

    #[test]
    fn test_unordered_constraints_report_cycle() {
        // p0 读 x@v0，p1 写 x；p1 读 y@v0，p0 写 y：WAR 约束互相矛盾
        let mut s = Setup::new();
        let x = s.buffer("x");
        let y = s.buffer("y");
        let p0 = s.pass("p0");
        let p1 = s.pass("p1");

        s.read(p0, x);
        s.write(p1, x);
        s.read(p1, y);
        s.write(p0, y);
        s.passes[p0.index()].side_effect = true;
        s.passes[p1.index()].side_effect = true;

        assert!(matches!(s.compile(), Err(RgError::Cycle { .. })));
    }

    #[test]
    fn test_subresource_extends_parent_lifetime() {
        let mut s = Setup::new();
        let parent = s.buffer("parent");
        let child = s
            .resources
            .register("child", RgBufferDesc::new(32, RgBufferUsage::STORAGE).into(), None, Some(parent.id()))
            .unwrap();

        let a = s.pass("a");
        let b = s.pass("b");
        let c1 = s.write(a, child);
        s.read(b, c1);
        s.passes[b.index()].side_effect = true;

        s.compile().unwrap();

        assert_eq!(s.passes[a.index()].devirtualize, vec![parent.id(), child.id()]);
        assert_eq!(s.passes[b.index()].destroy, vec![child.id(), parent.id()]);
        assert_eq!(s.resources.resource(parent.id()).unwrap().refcount, 2);
    }

    #[test]
    fn test_strict_mode_fails_on_rejected_usage() {
        let rejected = vec![RgError::IllegalImportedUsage {
            resource: "swapchain".to_string(),
            pass: "blit".to_string(),
            usage: "sampled read".to_string(),
        }];
        let options = RgCompileOptions::default().with_strict_imported_usage(true);
        let mut passes = Vec::new();
        let mut resources = RgResourceRegistry::new();

        let result = compile_graph(&mut passes, &mut resources, &rejected, &options);
        assert!(matches!(result, Err(RgError::RejectedDeclarations { count: 1, .. })));

        let lenient = compile_graph(&mut passes, &mut resources, &rejected, &RgCompileOptions::default());
        assert!(lenient.is_ok());
    }
}
