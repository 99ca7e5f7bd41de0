//! 版本、写入者、裁剪与生命周期的性质

mod common;

use common::{MockBackend, color_desc, depth_desc, record_execute, storage_buffer, swapchain_desc};
use truvis_frame_graph::frame_graph::{
    CompiledGraph, FrameGraph, RgAttachment, RgError, RgHandle, RgImageHandle, RgNodeKind, RgPassId, RgPhysicalHandle,
};

/// 延迟渲染管线
///
/// gbuffer -> ssao -> lighting -> present，另有一个没人使用输出的 debug pass。
struct Deferred<'a> {
    compiled: CompiledGraph<'a>,
    gbuffer_pass: RgPassId,
    ssao_pass: RgPassId,
    lighting_pass: RgPassId,
    debug_pass: RgPassId,
    swapchain: RgImageHandle,
}

fn build_deferred() -> anyhow::Result<Deferred<'static>> {
    let mut fg = FrameGraph::new();
    let swapchain = fg.import_render_target("swapchain", RgPhysicalHandle(1), swapchain_desc())?;
    let albedo = fg.create_image("albedo", color_desc())?;
    let normal = fg.create_image("normal", color_desc())?;
    let depth = fg.create_image("depth", depth_desc())?;
    let ssao = fg.create_image("ssao", color_desc())?;
    let debug = fg.create_image("debug", color_desc())?;

    let gbuffer_pass = fg.create_pass("gbuffer");
    let albedo = fg.write_attachment(gbuffer_pass, albedo, RgAttachment::Color(0))?;
    let normal = fg.write_attachment(gbuffer_pass, normal, RgAttachment::Color(1))?;
    let depth = fg.write_attachment(gbuffer_pass, depth, RgAttachment::Depth)?;

    let ssao_pass = fg.create_pass("ssao");
    fg.sample(ssao_pass, normal)?;
    fg.sample(ssao_pass, depth)?;
    let ssao = fg.write(ssao_pass, ssao)?;

    let lighting_pass = fg.create_pass("lighting");
    fg.sample(lighting_pass, albedo)?;
    fg.sample(lighting_pass, normal)?;
    fg.sample(lighting_pass, ssao)?;
    let swapchain = fg.write_attachment(lighting_pass, swapchain, RgAttachment::Color(0))?;

    let debug_pass = fg.create_pass("debug");
    fg.sample(debug_pass, depth)?;
    fg.write(debug_pass, debug)?;

    fg.present(swapchain)?;

    Ok(Deferred {
        compiled: fg.compile()?,
        gbuffer_pass,
        ssao_pass,
        lighting_pass,
        debug_pass,
        swapchain,
    })
}

#[test]
fn test_versions_increase_by_one_with_unique_writers() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let mut fg = FrameGraph::new();
    let mut handle = fg.create_buffer("accum", storage_buffer(4096))?;
    let mut writers = Vec::new();
    for i in 0..5 {
        let pass = fg.create_pass(format!("accumulate {}", i));
        let next = fg.write(pass, handle)?;
        assert_eq!(next.version(), handle.version() + 1);
        assert!(!fg.is_valid(handle));
        handle = next;
        writers.push(pass);
    }

    let resource = fg.resource(handle).ok_or_else(|| anyhow::anyhow!("resource missing"))?;
    assert_eq!(resource.version, 5);
    let nodes = resource.version_nodes();
    assert_eq!(nodes.len(), 6);

    let registry = fg.resources();
    assert_eq!(registry.node(nodes[0]).writer, None);
    for (version, &node) in nodes.iter().enumerate().skip(1) {
        assert_eq!(registry.node(node).version, version as u32);
        assert_eq!(registry.node(node).writer, Some(writers[version - 1]));
    }
    Ok(())
}

#[test]
fn test_every_node_has_at_most_one_writer() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let deferred = build_deferred()?;
    let compiled = &deferred.compiled;
    for node in compiled.resources().iter_nodes() {
        let writers = compiled.graph().writer_count(node.id);
        assert!(writers <= 1, "{} has {} writers", compiled.resources().node_label(node.id), writers);
        assert_eq!(writers, usize::from(node.writer.is_some()));
    }
    Ok(())
}

#[test]
fn test_repeated_read_is_recorded_once() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let mut fg = FrameGraph::new();
    let input = fg.create_image("input", color_desc())?;
    let pass = fg.create_pass("blur");
    for _ in 0..4 {
        let same = fg.read(pass, input)?;
        assert_eq!(same, input);
    }
    fg.sample(pass, input)?;
    fg.use_attachment(pass, input, RgAttachment::Color(0))?;

    let node = fg.pass(pass).ok_or_else(|| anyhow::anyhow!("pass missing"))?;
    assert_eq!(node.reads.len(), 1);
    assert_eq!(node.samples.len(), 1);
    assert_eq!(node.render_targets.len(), 1);
    Ok(())
}

#[test]
fn test_culling_keeps_only_observable_work() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let deferred = build_deferred()?;
    let compiled = &deferred.compiled;

    assert!(compiled.is_culled(deferred.debug_pass));
    for pass in [deferred.gbuffer_pass, deferred.ssao_pass, deferred.lighting_pass] {
        assert!(!compiled.is_culled(pass));
    }

    let names = compiled
        .execution_order()
        .iter()
        .filter_map(|&id| compiled.pass_name(id))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["gbuffer", "ssao", "lighting", "present"]);

    // 有副作用但没有任何写入的 Pass 同样保留
    let mut fg = FrameGraph::new();
    let marker = fg.add_callback_pass(
        "marker",
        |builder| {
            builder.side_effect();
            Ok(())
        },
        |_, ctx| record_execute(ctx),
    )?;
    let idle = fg.create_pass("idle");
    let compiled = fg.compile()?;
    assert_eq!(compiled.execution_order(), &[marker]);
    assert!(compiled.is_culled(idle));
    Ok(())
}

#[test]
fn test_lifetimes_bracket_every_use() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let deferred = build_deferred()?;
    let compiled = &deferred.compiled;
    let order = compiled.execution_order();
    let position = |pass: RgPassId| order.iter().position(|&p| p == pass);

    for resource in compiled.resources().iter_resources() {
        let devirtualized_at = order.iter().position(|&p| {
            compiled.pass_bracket(p).is_some_and(|(devirtualize, _)| devirtualize.contains(&resource.id))
        });
        let destroyed_at = order
            .iter()
            .position(|&p| compiled.pass_bracket(p).is_some_and(|(_, destroy)| destroy.contains(&resource.id)));

        if resource.is_imported() || resource.refcount == 0 {
            assert_eq!(devirtualized_at, None, "{} must not be devirtualized", resource.name);
            assert_eq!(destroyed_at, None, "{} must not be destroyed", resource.name);
            continue;
        }

        let (Some(alloc), Some(free)) = (devirtualized_at, destroyed_at) else {
            panic!("{} is used but not bracketed", resource.name);
        };
        for &pass in order {
            let Some(node) = compiled.pass(pass) else { continue };
            if node.declared_resources().any(|id| id == resource.id) {
                let at = position(pass).unwrap_or_default();
                assert!(alloc <= at && at <= free, "{} used outside its lifetime", resource.name);
            }
        }
        assert_eq!(Some(alloc), resource.first.and_then(position));
        assert_eq!(Some(free), resource.last.and_then(position));
    }

    // debug 图像只被裁剪掉的 Pass 使用，不会分配
    let debug = compiled.resources().iter_resources().find(|res| res.name == "debug");
    assert_eq!(debug.map(|res| res.refcount), Some(0));
    assert_eq!(compiled.resource(deferred.swapchain).map(|res| res.refcount), Some(2));
    Ok(())
}

#[test]
fn test_cycle_fails_without_plan() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let mut fg = FrameGraph::new();
    let r1 = fg.create_buffer("r1", storage_buffer(64))?;
    let r2 = fg.create_buffer("r2", storage_buffer(64))?;
    let a = fg.create_pass("a");
    let b = fg.create_pass("b");

    let r1 = fg.write(a, r1)?;
    fg.read(b, r1)?;
    let r2 = fg.write(b, r2)?;
    fg.read(a, r2)?;

    let err = fg.compile().err().ok_or_else(|| anyhow::anyhow!("cycle not detected"))?;
    assert!(matches!(&err, RgError::Cycle { passes, .. } if passes.len() == 2));
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_write_to_imported_always_has_side_effect() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let mut fg = FrameGraph::new();
    let history = fg.import_image("history", RgPhysicalHandle(7), color_desc())?;
    let history_mip = fg.create_subresource(history, "history mip", color_desc().with_size(640, 360))?;
    let readback = fg.import_buffer("readback", RgPhysicalHandle(8), storage_buffer(256))?;

    let p0 = fg.create_pass("write history");
    fg.write(p0, history)?;
    let p1 = fg.create_pass("write mip");
    fg.write(p1, history_mip)?;
    let p2 = fg.create_pass("readback");
    fg.write(p2, readback)?;

    for pass in [p0, p1, p2] {
        assert!(fg.pass(pass).is_some_and(|node| node.side_effect));
    }

    let compiled = fg.compile()?;
    assert_eq!(compiled.execution_order(), &[p0, p1, p2]);

    let mut backend = MockBackend::default();
    compiled.execute(&mut backend)?;
    assert!(backend.allocated_names().is_empty());
    Ok(())
}

#[test]
fn test_reachability_queries() -> anyhow::Result<()> {
    truvis_crate_tools::init_test_log();

    let deferred = build_deferred()?;
    let compiled = &deferred.compiled;
    let pass = RgNodeKind::Pass;

    assert!(compiled.is_reachable(pass(deferred.gbuffer_pass), pass(deferred.lighting_pass)));
    assert!(compiled.is_reachable(pass(deferred.gbuffer_pass), pass(deferred.debug_pass)));
    assert!(!compiled.is_reachable(pass(deferred.lighting_pass), pass(deferred.gbuffer_pass)));
    assert!(!compiled.is_reachable(pass(deferred.debug_pass), pass(deferred.lighting_pass)));
    Ok(())
}
