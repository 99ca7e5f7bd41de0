//! 依赖图
//!
//! Pass 与资源节点放在同一个有向图中：
//! - 读边：资源节点 -> Pass
//! - 写边：Pass -> 资源节点
//!
//! 使用 petgraph 的 DiGraph 存储，节点和边都通过整数索引引用。

use std::collections::VecDeque;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use super::resource_handle::{RgPassId, RgResourceNodeId};

/// 图节点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgNodeKind {
    Pass(RgPassId),
    Resource(RgResourceNodeId),
}

/// 图边
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgEdgeKind {
    /// 资源节点 -> Pass
    Read,
    /// Pass -> 资源节点
    Write,
}

/// DFS 着色
#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// 依赖图
pub struct DependencyGraph {
    graph: DiGraph<RgNodeKind, RgEdgeKind>,
    /// Pass 索引到图节点的映射
    pass_nodes: Vec<NodeIndex>,
    /// 资源节点索引到图节点的映射
    resource_nodes: Vec<NodeIndex>,
}

// new & init
impl DependencyGraph {
    /// 为所有 Pass 和资源节点创建图节点，此时还没有边
    pub fn new(pass_count: usize, resource_node_count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(pass_count + resource_node_count, pass_count * 4);
        let pass_nodes = (0..pass_count).map(|i| graph.add_node(RgNodeKind::Pass(RgPassId(i as u32)))).collect();
        let resource_nodes = (0..resource_node_count)
            .map(|i| graph.add_node(RgNodeKind::Resource(RgResourceNodeId(i as u32))))
            .collect();

        Self {
            graph,
            pass_nodes,
            resource_nodes,
        }
    }

    /// 添加读边，重复添加只保留一条
    pub fn add_read_edge(&mut self, resource: RgResourceNodeId, pass: RgPassId) {
        let from = self.resource_nodes[resource.index()];
        let to = self.pass_nodes[pass.index()];
        self.graph.update_edge(from, to, RgEdgeKind::Read);
    }

    /// 添加写边
    ///
    /// 不做去重：同一个资源节点出现两条写边正是 single-writer 检查要发现的问题。
    pub fn add_write_edge(&mut self, pass: RgPassId, resource: RgResourceNodeId) {
        let from = self.pass_nodes[pass.index()];
        let to = self.resource_nodes[resource.index()];
        self.graph.add_edge(from, to, RgEdgeKind::Write);
    }
}

// getter
impl DependencyGraph {
    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[inline]
    pub fn node_index(&self, node: RgNodeKind) -> NodeIndex {
        match node {
            RgNodeKind::Pass(pass) => self.pass_nodes[pass.index()],
            RgNodeKind::Resource(resource) => self.resource_nodes[resource.index()],
        }
    }

    #[inline]
    pub fn kind(&self, index: NodeIndex) -> RgNodeKind {
        self.graph[index]
    }

    /// 指向资源节点的写边数量
    pub fn writer_count(&self, resource: RgResourceNodeId) -> usize {
        self.graph
            .edges_directed(self.resource_nodes[resource.index()], Direction::Incoming)
            .filter(|edge| *edge.weight() == RgEdgeKind::Write)
            .count()
    }

    /// 读取某个资源节点的所有 Pass
    pub fn readers(&self, resource: RgResourceNodeId) -> impl Iterator<Item = RgPassId> + '_ {
        self.graph
            .edges_directed(self.resource_nodes[resource.index()], Direction::Outgoing)
            .filter_map(|edge| match self.graph[edge.target()] {
                RgNodeKind::Pass(pass) => Some(pass),
                RgNodeKind::Resource(_) => None,
            })
    }

    /// 从 `from` 出发能否到达 `to`
    pub fn is_reachable(&self, from: RgNodeKind, to: RgNodeKind) -> bool {
        has_path_connecting(&self.graph, self.node_index(from), self.node_index(to), None)
    }
}

// algorithm
impl DependencyGraph {
    /// 查找一个环
    ///
    /// 迭代式 DFS，白/灰/黑三色标记，遇到指向灰色节点的边即为回边。
    /// 返回环上的节点，按边的方向排列。
    pub fn find_cycle(&self) -> Option<Vec<RgNodeKind>> {
        let node_count = self.graph.node_count();
        let mut color = vec![Color::White; node_count];
        let mut parent: Vec<Option<NodeIndex>> = vec![None; node_count];

        for start in self.graph.node_indices() {
            if color[start.index()] != Color::White {
                continue;
            }

            // 栈中保存节点及其尚未访问的后继
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
            color[start.index()] = Color::Gray;
            stack.push((start, self.successors(start)));

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                let Some(next) = pending.pop() else {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    continue;
                };

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        parent[next.index()] = Some(node);
                        stack.push((next, self.successors(next)));
                    }
                    Color::Gray => return Some(self.collect_cycle(&parent, node, next)),
                    Color::Black => {}
                }
            }
        }
        None
    }

    /// 沿 parent 链从 `tail` 回溯到 `head`，得到 head -> ... -> tail
    fn collect_cycle(&self, parent: &[Option<NodeIndex>], tail: NodeIndex, head: NodeIndex) -> Vec<RgNodeKind> {
        let mut cycle = vec![self.graph[tail]];
        let mut current = tail;
        while current != head {
            match parent[current.index()] {
                Some(prev) => {
                    cycle.push(self.graph[prev]);
                    current = prev;
                }
                None => break,
            }
        }
        cycle.reverse();
        cycle
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        // petgraph 按插入的逆序返回邻居，从末尾弹出即按边的插入顺序访问
        self.graph.neighbors_directed(node, Direction::Outgoing).collect()
    }

    /// 整张图的拓扑序，存在环时返回 `None`
    pub fn topological_order(&self) -> Option<Vec<RgNodeKind>> {
        toposort(&self.graph, None).ok().map(|order| order.into_iter().map(|index| self.graph[index]).collect())
    }

    /// 反向可达性：从根 Pass 出发沿入边回溯，能到达的 Pass 都是存活的
    ///
    /// 返回按 Pass 索引排列的存活标记。
    pub fn live_passes(&self, roots: impl IntoIterator<Item = RgPassId>) -> Vec<bool> {
        let mut live = vec![false; self.pass_nodes.len()];
        let mut visited = vec![false; self.graph.node_count()];
        let mut queue = VecDeque::new();

        for root in roots {
            let index = self.pass_nodes[root.index()];
            if !visited[index.index()] {
                visited[index.index()] = true;
                queue.push_back(index);
            }
        }

        while let Some(index) = queue.pop_front() {
            if let RgNodeKind::Pass(pass) = self.graph[index] {
                live[pass.index()] = true;
            }
            for prev in self.graph.neighbors_directed(index, Direction::Incoming) {
                if !visited[prev.index()] {
                    visited[prev.index()] = true;
                    queue.push_back(prev);
                }
            }
        }

        live
    }
}
