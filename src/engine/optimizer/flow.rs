// ==========================================
// 进口散货分配系统 - 最小费用最大流求解器
// ==========================================
// 算法: 逐次最短路 (SSP)，最短路用 SPFA（允许负费用边）
// 约束:
//   - 容量与费用均为整数（流量单位: 千克）
//   - 初始图为 DAG，残量网络不存在负环
//   - 边与邻接表按插入顺序遍历，结果确定
// ==========================================

use super::Deadline;
use crate::engine::error::EngineResult;
use std::collections::VecDeque;

const INF: i64 = i64::MAX / 4;

#[derive(Debug, Clone)]
struct FlowEdge {
    to: usize,
    cap: i64, // 残量
    cost: i64,
}

/// 求解统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSummary {
    pub flow: i64,
    pub cost: i128,
    pub augmentations: usize,
}

// ==========================================
// MinCostFlow - 残量网络
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MinCostFlow {
    adj: Vec<Vec<usize>>,
    edges: Vec<FlowEdge>,
}

impl MinCostFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self) -> usize {
        self.adj.push(Vec::new());
        self.adj.len() - 1
    }

    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// 添加有向边，返回正向边编号（反向边编号 = id ^ 1）
    pub fn add_edge(&mut self, from: usize, to: usize, cap: i64, cost: i64) -> usize {
        let id = self.edges.len();
        self.edges.push(FlowEdge {
            to,
            cap: cap.max(0),
            cost,
        });
        self.edges.push(FlowEdge {
            to: from,
            cap: 0,
            cost: -cost,
        });
        self.adj[from].push(id);
        self.adj[to].push(id + 1);
        id
    }

    /// 正向边上的流量（= 反向边残量）
    pub fn flow_on(&self, edge_id: usize) -> i64 {
        self.edges[edge_id ^ 1].cap
    }

    /// 求 source → sink 的最小费用最大流
    pub fn solve(&mut self, source: usize, sink: usize, deadline: &Deadline) -> EngineResult<FlowSummary> {
        let n = self.adj.len();
        let mut summary = FlowSummary {
            flow: 0,
            cost: 0,
            augmentations: 0,
        };

        let mut dist = vec![INF; n];
        let mut prev_edge = vec![usize::MAX; n];
        let mut in_queue = vec![false; n];
        let mut queue = VecDeque::with_capacity(n);

        loop {
            deadline.check()?;

            dist.iter_mut().for_each(|d| *d = INF);
            prev_edge.iter_mut().for_each(|p| *p = usize::MAX);
            dist[source] = 0;
            queue.push_back(source);
            in_queue[source] = true;

            while let Some(u) = queue.pop_front() {
                in_queue[u] = false;
                let du = dist[u];
                for &e in &self.adj[u] {
                    let edge = &self.edges[e];
                    if edge.cap <= 0 {
                        continue;
                    }
                    let nd = du + edge.cost;
                    if nd < dist[edge.to] {
                        dist[edge.to] = nd;
                        prev_edge[edge.to] = e;
                        if !in_queue[edge.to] {
                            in_queue[edge.to] = true;
                            queue.push_back(edge.to);
                        }
                    }
                }
            }

            if dist[sink] >= INF {
                break;
            }

            // 瓶颈容量
            let mut push = i64::MAX;
            let mut v = sink;
            while v != source {
                let e = prev_edge[v];
                push = push.min(self.edges[e].cap);
                v = self.edges[e ^ 1].to;
            }

            let mut v = sink;
            while v != source {
                let e = prev_edge[v];
                self.edges[e].cap -= push;
                self.edges[e ^ 1].cap += push;
                v = self.edges[e ^ 1].to;
            }

            summary.flow += push;
            summary.cost += push as i128 * dist[sink] as i128;
            summary.augmentations += 1;
        }

        Ok(summary)
    }
}
