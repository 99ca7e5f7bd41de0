//! 集成测试共用的后端与资源描述

#![allow(dead_code)]

use slotmap::{DefaultKey, Key, KeyData, SlotMap};
use truvis_frame_graph::frame_graph::{
    RgAllocError, RgAllocRequest, RgBackend, RgBufferDesc, RgBufferUsage, RgFormat, RgImageDesc, RgImageUsage,
    RgPassContext, RgPassId, RgPhysicalHandle,
};

/// 后端收到的调用
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Allocate(String),
    Destroy(String),
    Begin(String),
    Execute(String),
    End(String),
}

/// 记录所有调用的后端
///
/// 物理句柄就是 slotmap key 的 ffi 表示。
#[derive(Default)]
pub struct MockBackend {
    live: SlotMap<DefaultKey, String>,
    pub events: Vec<Event>,
    /// 分配请求中的父资源句柄
    pub parents: Vec<(String, Option<RgPhysicalHandle>)>,
    /// 分配该名称的资源时返回失败
    pub fail_on: Option<String>,
}

impl MockBackend {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// 尚未销毁的资源数量
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn allocated_names(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Allocate(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn executed_passes(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Begin(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }
}

impl RgBackend for MockBackend {
    fn allocate(&mut self, request: &RgAllocRequest<'_>) -> Result<RgPhysicalHandle, RgAllocError> {
        if self.fail_on.as_deref() == Some(request.name) {
            return Err(RgAllocError::OutOfMemory { requested: 1 << 30 });
        }

        let key = self.live.insert(request.name.to_string());
        self.events.push(Event::Allocate(request.name.to_string()));
        self.parents.push((request.name.to_string(), request.parent));
        Ok(RgPhysicalHandle(key.data().as_ffi()))
    }

    fn destroy(&mut self, handle: RgPhysicalHandle) {
        let key = DefaultKey::from(KeyData::from_ffi(handle.0));
        if let Some(name) = self.live.remove(key) {
            self.events.push(Event::Destroy(name));
        }
    }

    fn begin_pass(&mut self, _pass: RgPassId, name: &str) {
        self.events.push(Event::Begin(name.to_string()));
    }

    fn end_pass(&mut self, _pass: RgPassId, name: &str) {
        self.events.push(Event::End(name.to_string()));
    }
}

/// 执行回调：在后端记录一次执行
pub fn record_execute(ctx: &mut RgPassContext<'_>) {
    let name = ctx.pass_name().to_string();
    if let Some(backend) = ctx.backend::<MockBackend>() {
        backend.events.push(Event::Execute(name));
    }
}

pub fn color_desc() -> RgImageDesc {
    RgImageDesc::new_2d(
        1280,
        720,
        RgFormat::Rgba16Float,
        RgImageUsage::COLOR_ATTACHMENT | RgImageUsage::SAMPLED | RgImageUsage::STORAGE,
    )
}

pub fn depth_desc() -> RgImageDesc {
    RgImageDesc::new_2d(1280, 720, RgFormat::D32Float, RgImageUsage::DEPTH_STENCIL_ATTACHMENT | RgImageUsage::SAMPLED)
}

pub fn swapchain_desc() -> RgImageDesc {
    RgImageDesc::new_2d(1280, 720, RgFormat::Bgra8Srgb, RgImageUsage::COLOR_ATTACHMENT)
}

pub fn storage_buffer(size: u64) -> RgBufferDesc {
    RgBufferDesc::new(size, RgBufferUsage::STORAGE)
}
