//! Serialize a `Document` to XML.
//!
//! Output depends only on the document; the same document always produces
//! the same bytes.

use super::document::*;
use super::format::{FnFmt, Mat, Spaced};
use errors::Result;
use std::fmt::Write;
use util::name::XmlText;

pub fn write<W: Write>(w: &mut W, doc: &Document) -> Result<()> {
    write_lines!(w,
        r##"<?xml version="1.0" encoding="utf-8"?>"##,
        r##"<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">"##;
    )?;
    write_asset(w, &doc.asset)?;
    write_library_cameras(w, &doc.cameras)?;
    write_library_lights(w, &doc.lights)?;
    write_library_images(w, &doc.images)?;
    write_library_effects(w, &doc.effects)?;
    write_library_materials(w, &doc.materials)?;
    write_library_geometries(w, &doc.geometries)?;
    write_library_controllers(w, &doc.controllers)?;
    write_library_animations(w, &doc.animations)?;
    write_library_animation_clips(w, &doc.clips)?;
    write_library_visual_scenes(w, &doc.visual_scene)?;
    write_lines!(w,
        r##"  <scene>"##,
        r##"    <instance_visual_scene url="#{id}"/>"##,
        r##"  </scene>"##,
        r##"</COLLADA>"##;
        id = doc.visual_scene.id,
    )?;
    Ok(())
}

fn write_asset<W: Write>(w: &mut W, asset: &Asset) -> Result<()> {
    write_lines!(w,
        r##"  <asset>"##,
        r##"    <contributor>"##,
        r##"      <authoring_tool>{tool}</authoring_tool>"##,
        r##"    </contributor>"##,
        r##"    <created>{time}</created>"##,
        r##"    <modified>{time}</modified>"##,
        r##"    <unit name="meter" meter="1"/>"##,
        r##"    <up_axis>Z_UP</up_axis>"##,
        r##"  </asset>"##;
        tool = XmlText(&asset.authoring_tool),
        time = asset.timestamp,
    )?;
    Ok(())
}

/// Writes `<source>`, indented by `indent` spaces.
fn write_source<W: Write>(w: &mut W, src: &Source, indent: usize) -> Result<()> {
    let pad = Pad(indent);
    let (array_tag, values) = match src.array {
        Array::F32(ref xs) => ("float_array", FnBox::new(move |f| write!(f, "{}", Spaced(&xs[..])))),
        Array::F64(ref xs) => ("float_array", FnBox::new(move |f| write!(f, "{}", Spaced(&xs[..])))),
        Array::Matrices(ref ms) => ("float_array", FnBox::new(move |f| {
            for (i, m) in ms.iter().enumerate() {
                if i != 0 { f.write_str(" ")?; }
                write!(f, "{}", Mat(m))?;
            }
            Ok(())
        })),
        Array::Name(ref names) => ("Name_array", FnBox::new(move |f| write!(f, "{}", Spaced(&names[..])))),
        Array::IdRef(ref ids) => ("IDREF_array", FnBox::new(move |f| write!(f, "{}", Spaced(&ids[..])))),
    };
    write_lines!(w,
        r##"{pad}<source id="{id}">"##,
        r##"{pad}  <{tag} id="{array_id}" count="{len}">{values}</{tag}>"##,
        r##"{pad}  <technique_common>"##,
        r##"{pad}    <accessor source="#{array_id}" count="{count}" stride="{stride}">"##;
        pad = pad, id = src.id, array_id = src.array_id, tag = array_tag, len = src.array.len(), values = values,
        count = src.count(), stride = src.stride,
    )?;
    for &(name, ty) in src.params {
        write_lines!(w,
            r##"{pad}      <param name="{name}" type="{ty}"/>"##;
            pad = pad, name = name, ty = ty,
        )?;
    }
    write_lines!(w,
        r##"{pad}    </accessor>"##,
        r##"{pad}  </technique_common>"##,
        r##"{pad}</source>"##;
        pad = pad,
    )?;
    Ok(())
}

struct Pad(usize);

impl ::std::fmt::Display for Pad {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        for _ in 0..self.0 {
            f.write_str(" ")?;
        }
        Ok(())
    }
}

/// A boxed `FnFmt`, so differently-typed closures fit in one variable.
struct FnBox<'a>(Box<Fn(&mut ::std::fmt::Formatter) -> ::std::fmt::Result + 'a>);

impl<'a> FnBox<'a> {
    fn new<F>(f: F) -> FnBox<'a>
    where F: Fn(&mut ::std::fmt::Formatter) -> ::std::fmt::Result + 'a {
        FnBox(Box::new(f))
    }
}

impl<'a> ::std::fmt::Display for FnBox<'a> {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        (self.0)(f)
    }
}

fn write_library_cameras<W: Write>(w: &mut W, cameras: &[Camera]) -> Result<()> {
    if cameras.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_cameras>"##;
    )?;
    for cam in cameras {
        write_lines!(w,
            r##"    <camera id="{id}" name="{name}">"##,
            r##"      <optics>"##,
            r##"        <technique_common>"##;
            id = cam.id, name = XmlText(&cam.name),
        )?;
        match cam.optics {
            Optics::Perspective { xfov } => {
                write_lines!(w,
                    r##"          <perspective>"##,
                    r##"            <xfov sid="xfov">{xfov}</xfov>"##,
                    r##"            <aspect_ratio>{aspect}</aspect_ratio>"##,
                    r##"            <znear sid="znear">{znear}</znear>"##,
                    r##"            <zfar sid="zfar">{zfar}</zfar>"##,
                    r##"          </perspective>"##;
                    xfov = xfov, aspect = cam.aspect_ratio, znear = cam.znear, zfar = cam.zfar,
                )?;
            }
            Optics::Orthographic { xmag } => {
                write_lines!(w,
                    r##"          <orthographic>"##,
                    r##"            <xmag sid="xmag">{xmag}</xmag>"##,
                    r##"            <aspect_ratio>{aspect}</aspect_ratio>"##,
                    r##"            <znear sid="znear">{znear}</znear>"##,
                    r##"            <zfar sid="zfar">{zfar}</zfar>"##,
                    r##"          </orthographic>"##;
                    xmag = xmag, aspect = cam.aspect_ratio, znear = cam.znear, zfar = cam.zfar,
                )?;
            }
        }
        write_lines!(w,
            r##"        </technique_common>"##,
            r##"      </optics>"##,
            r##"    </camera>"##;
        )?;
    }
    write_lines!(w,
        r##"  </library_cameras>"##;
    )?;
    Ok(())
}

fn write_library_lights<W: Write>(w: &mut W, lights: &[Light]) -> Result<()> {
    if lights.is_empty() { return Ok(()); }

    fn write_attenuation<W: Write>(w: &mut W, att: &Attenuation) -> Result<()> {
        write_lines!(w,
            r##"          <constant_attenuation>{c}</constant_attenuation>"##,
            r##"          <linear_attenuation>{l}</linear_attenuation>"##,
            r##"          <quadratic_attenuation>{q}</quadratic_attenuation>"##;
            c = att.constant, l = att.linear, q = att.quadratic,
        )?;
        Ok(())
    }

    write_lines!(w,
        r##"  <library_lights>"##;
    )?;
    for light in lights {
        let tag = match light.kind {
            LightKind::Directional => "directional",
            LightKind::Point { .. } => "point",
            LightKind::Spot { .. } => "spot",
        };
        write_lines!(w,
            r##"    <light id="{id}" name="{name}">"##,
            r##"      <technique_common>"##,
            r##"        <{tag}>"##,
            r##"          <color>{r} {g} {b}</color>"##;
            id = light.id, name = XmlText(&light.name), tag = tag,
            r = light.color[0], g = light.color[1], b = light.color[2],
        )?;
        match light.kind {
            LightKind::Directional => (),
            LightKind::Point { ref attenuation } => write_attenuation(w, attenuation)?,
            LightKind::Spot { ref attenuation, falloff_angle, falloff_exponent } => {
                write_attenuation(w, attenuation)?;
                write_lines!(w,
                    r##"          <falloff_angle>{angle}</falloff_angle>"##,
                    r##"          <falloff_exponent>{exp}</falloff_exponent>"##;
                    angle = falloff_angle, exp = falloff_exponent,
                )?;
            }
        }
        write_lines!(w,
            r##"        </{tag}>"##,
            r##"      </technique_common>"##,
            r##"    </light>"##;
            tag = tag,
        )?;
    }
    write_lines!(w,
        r##"  </library_lights>"##;
    )?;
    Ok(())
}

fn write_library_images<W: Write>(w: &mut W, images: &[Image]) -> Result<()> {
    if images.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_images>"##;
    )?;
    for image in images {
        write_lines!(w,
            r##"    <image id="{id}" name="{name}">"##,
            r##"      <init_from>{path}</init_from>"##,
            r##"    </image>"##;
            id = image.id, name = XmlText(&image.name), path = XmlText(&image.init_from),
        )?;
    }
    write_lines!(w,
        r##"  </library_images>"##;
    )?;
    Ok(())
}

fn write_library_effects<W: Write>(w: &mut W, effects: &[Effect]) -> Result<()> {
    if effects.is_empty() { return Ok(()); }

    let color = |c: &[f32; 4]| format!("<color>{} {} {} {}</color>", c[0], c[1], c[2], c[3]);

    write_lines!(w,
        r##"  <library_effects>"##;
    )?;
    for effect in effects {
        write_lines!(w,
            r##"    <effect id="{id}" name="{name}">"##,
            r##"      <profile_COMMON>"##;
            id = effect.id, name = XmlText(&effect.name),
        )?;

        if let Some(ref image) = effect.texture {
            write_lines!(w,
                r##"        <newparam sid="{image}-surface">"##,
                r##"          <surface type="2D">"##,
                r##"            <init_from>{image}</init_from>"##,
                r##"          </surface>"##,
                r##"        </newparam>"##,
                r##"        <newparam sid="{image}-sampler">"##,
                r##"          <sampler2D>"##,
                r##"            <source>{image}-surface</source>"##,
                r##"          </sampler2D>"##,
                r##"        </newparam>"##;
                image = image,
            )?;
        }

        write_lines!(w,
            r##"        <technique sid="common">"##,
            r##"          <phong>"##,
            r##"            <emission>"##,
            r##"              {emission}"##,
            r##"            </emission>"##,
            r##"            <diffuse>"##,
            r##"              {diffuse}"##,
            r##"            </diffuse>"##,
            r##"            <specular>"##,
            r##"              {specular}"##,
            r##"            </specular>"##,
            r##"            <shininess>"##,
            r##"              <float sid="shininess">{shininess}</float>"##,
            r##"            </shininess>"##,
            r##"          </phong>"##,
            r##"        </technique>"##,
            r##"      </profile_COMMON>"##,
            r##"    </effect>"##;
            emission = color(&effect.emission),
            diffuse = match effect.texture {
                Some(ref image) => format!(r#"<texture texture="{}-sampler" texcoord="CHANNEL0"/>"#, image),
                None => color(&effect.diffuse),
            },
            specular = color(&effect.specular),
            shininess = effect.shininess,
        )?;
    }
    write_lines!(w,
        r##"  </library_effects>"##;
    )?;
    Ok(())
}

fn write_library_materials<W: Write>(w: &mut W, materials: &[Material]) -> Result<()> {
    if materials.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_materials>"##;
    )?;
    for mat in materials {
        write_lines!(w,
            r##"    <material id="{id}" name="{name}">"##,
            r##"      <instance_effect url="#{effect}"/>"##,
            r##"    </material>"##;
            id = mat.id, name = XmlText(&mat.name), effect = mat.effect,
        )?;
    }
    write_lines!(w,
        r##"  </library_materials>"##;
    )?;
    Ok(())
}

fn write_inputs<W: Write>(w: &mut W, inputs: &[Input], indent: usize, offsets: bool) -> Result<()> {
    for input in inputs {
        write!(w, r##"{pad}<input semantic="{semantic}" source="#{source}""##,
            pad = Pad(indent), semantic = input.semantic, source = input.source)?;
        if offsets {
            write!(w, r#" offset="0""#)?;
        }
        if let Some(set) = input.set {
            write!(w, r#" set="{}""#, set)?;
        }
        write_lines!(w, "/>";)?;
    }
    Ok(())
}

fn write_library_geometries<W: Write>(w: &mut W, geometries: &[Geometry]) -> Result<()> {
    write_lines!(w,
        r##"  <library_geometries>"##;
    )?;
    for geom in geometries {
        write_lines!(w,
            r##"    <geometry id="{id}" name="{name}">"##;
            id = geom.id, name = XmlText(&geom.name),
        )?;
        match geom.kind {
            GeometryKind::Mesh(ref mesh) => write_mesh(w, mesh)?,
            GeometryKind::Spline(ref spline) => write_spline(w, spline)?,
        }
        write_lines!(w,
            r##"    </geometry>"##;
        )?;
    }
    write_lines!(w,
        r##"  </library_geometries>"##;
    )?;
    Ok(())
}

fn write_mesh<W: Write>(w: &mut W, mesh: &Mesh) -> Result<()> {
    write_lines!(w,
        r##"      <mesh>"##;
    )?;
    for src in &mesh.sources {
        write_source(w, src, 8)?;
    }
    write_lines!(w,
        r##"        <vertices id="{id}">"##,
        r##"          <input semantic="POSITION" source="#{positions}"/>"##,
        r##"        </vertices>"##;
        id = mesh.vertices_id, positions = mesh.positions,
    )?;

    for prim in &mesh.primitives {
        let tag = match prim.kind {
            PrimitiveKind::Triangles => "triangles",
            PrimitiveKind::Polylist => "polylist",
        };
        write!(w, "        <{}", tag)?;
        if let Some(ref material) = prim.material {
            write!(w, r#" material="{}""#, material)?;
        }
        write_lines!(w, r#" count="{}">"#; prim.count)?;
        write_inputs(w, &prim.inputs, 10, true)?;
        if prim.kind == PrimitiveKind::Polylist {
            write_lines!(w,
                r##"          <vcount>{}</vcount>"##;
                Spaced(&prim.vcounts[..]),
            )?;
        }
        write_lines!(w,
            r##"          <p>{indices}</p>"##,
            r##"        </{tag}>"##;
            indices = Spaced(&prim.indices[..]), tag = tag,
        )?;
    }

    write_lines!(w,
        r##"      </mesh>"##;
    )?;
    Ok(())
}

fn write_spline<W: Write>(w: &mut W, spline: &Spline) -> Result<()> {
    write_lines!(w,
        r##"      <spline closed="{closed}">"##;
        closed = spline.closed,
    )?;
    for src in &spline.sources {
        write_source(w, src, 8)?;
    }
    write_lines!(w,
        r##"        <control_vertices>"##;
    )?;
    write_inputs(w, &spline.control_vertices, 10, false)?;
    write_lines!(w,
        r##"        </control_vertices>"##,
        r##"      </spline>"##;
    )?;
    Ok(())
}

fn write_library_controllers<W: Write>(w: &mut W, controllers: &[Controller]) -> Result<()> {
    if controllers.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_controllers>"##;
    )?;
    for ctrl in controllers {
        write_lines!(w,
            r##"    <controller id="{id}" name="{name}">"##;
            id = ctrl.id, name = XmlText(&ctrl.name),
        )?;
        match ctrl.kind {
            ControllerKind::Skin(ref skin) => write_skin(w, skin)?,
            ControllerKind::Morph(ref morph) => write_morph(w, morph)?,
        }
        write_lines!(w,
            r##"    </controller>"##;
        )?;
    }
    write_lines!(w,
        r##"  </library_controllers>"##;
    )?;
    Ok(())
}

fn write_skin<W: Write>(w: &mut W, skin: &Skin) -> Result<()> {
    write_lines!(w,
        r##"      <skin source="#{source}">"##,
        r##"        <bind_shape_matrix>{bind_shape}</bind_shape_matrix>"##;
        source = skin.source, bind_shape = Mat(&skin.bind_shape),
    )?;
    write_source(w, &skin.joints, 8)?;
    write_source(w, &skin.inv_binds, 8)?;
    write_source(w, &skin.weights, 8)?;

    write_lines!(w,
        r##"        <joints>"##,
        r##"          <input semantic="JOINT" source="#{joints}"/>"##,
        r##"          <input semantic="INV_BIND_MATRIX" source="#{inv_binds}"/>"##,
        r##"        </joints>"##;
        joints = skin.joints.id, inv_binds = skin.inv_binds.id,
    )?;

    write_lines!(w,
        r##"        <vertex_weights count="{num_verts}">"##,
        r##"          <input semantic="JOINT" source="#{joints}" offset="0"/>"##,
        r##"          <input semantic="WEIGHT" source="#{weights}" offset="1"/>"##,
        r##"          <vcount>{vcount}</vcount>"##,
        r##"          <v>{v}</v>"##,
        r##"        </vertex_weights>"##,
        r##"      </skin>"##;
        num_verts = skin.vcounts.len(),
        joints = skin.joints.id, weights = skin.weights.id,
        vcount = Spaced(&skin.vcounts[..]),
        v = FnFmt(|f| {
            for (i, &(joint, weight)) in skin.v.iter().enumerate() {
                if i != 0 { f.write_str(" ")?; }
                write!(f, "{} {}", joint, weight)?;
            }
            Ok(())
        }),
    )?;
    Ok(())
}

fn write_morph<W: Write>(w: &mut W, morph: &Morph) -> Result<()> {
    write_lines!(w,
        r##"      <morph source="#{source}" method="NORMALIZED">"##;
        source = morph.source,
    )?;
    write_source(w, &morph.targets, 8)?;
    write_source(w, &morph.weights, 8)?;
    write_lines!(w,
        r##"        <targets>"##,
        r##"          <input semantic="MORPH_TARGET" source="#{targets}"/>"##,
        r##"          <input semantic="MORPH_WEIGHT" source="#{weights}"/>"##,
        r##"        </targets>"##,
        r##"      </morph>"##;
        targets = morph.targets.id, weights = morph.weights.id,
    )?;
    Ok(())
}

fn write_library_animations<W: Write>(w: &mut W, animations: &[Animation]) -> Result<()> {
    if animations.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_animations>"##;
    )?;
    for anim in animations {
        write_lines!(w,
            r##"    <animation id="{id}">"##;
            id = anim.id,
        )?;
        write_source(w, &anim.input, 6)?;
        write_source(w, &anim.output, 6)?;
        write_source(w, &anim.interpolation, 6)?;
        write_lines!(w,
            r##"      <sampler id="{sampler}">"##,
            r##"        <input semantic="INPUT" source="#{input}"/>"##,
            r##"        <input semantic="OUTPUT" source="#{output}"/>"##,
            r##"        <input semantic="INTERPOLATION" source="#{interpolation}"/>"##,
            r##"      </sampler>"##,
            r##"      <channel source="#{sampler}" target="{target}"/>"##,
            r##"    </animation>"##;
            sampler = anim.sampler_id, input = anim.input.id, output = anim.output.id,
            interpolation = anim.interpolation.id, target = anim.target,
        )?;
    }
    write_lines!(w,
        r##"  </library_animations>"##;
    )?;
    Ok(())
}

fn write_library_animation_clips<W: Write>(w: &mut W, clips: &[AnimationClip]) -> Result<()> {
    if clips.is_empty() { return Ok(()); }

    write_lines!(w,
        r##"  <library_animation_clips>"##;
    )?;
    for clip in clips {
        write_lines!(w,
            r##"    <animation_clip id="{id}" name="{name}" start="{start}" end="{end}">"##;
            id = clip.id, name = XmlText(&clip.name), start = clip.start, end = clip.end,
        )?;
        for anim in &clip.animations {
            write_lines!(w,
                r##"      <instance_animation url="#{anim}"/>"##;
                anim = anim,
            )?;
        }
        write_lines!(w,
            r##"    </animation_clip>"##;
        )?;
    }
    write_lines!(w,
        r##"  </library_animation_clips>"##;
    )?;
    Ok(())
}

fn write_library_visual_scenes<W: Write>(w: &mut W, scene: &VisualScene) -> Result<()> {
    write_lines!(w,
        r##"  <library_visual_scenes>"##,
        r##"    <visual_scene id="{id}" name="{name}">"##;
        id = scene.id, name = XmlText(&scene.name),
    )?;
    for node in &scene.nodes {
        write_node(w, node, 0)?;
    }
    write_lines!(w,
        r##"    </visual_scene>"##,
        r##"  </library_visual_scenes>"##;
    )?;
    Ok(())
}

fn write_indent<W: Write>(w: &mut W, indent: u32) -> Result<()> {
    // Base indent
    write!(w, "      ")?;
    for _ in 0..indent {
        write!(w, "  ")?;
    }
    Ok(())
}

fn write_node<W: Write>(w: &mut W, node: &Node, indent: u32) -> Result<()> {
    write_indent(w, indent)?;
    write!(w, r#"<node id="{}""#, node.id)?;
    if let Some(ref sid) = node.sid {
        write!(w, r#" sid="{}""#, sid)?;
    }
    write_lines!(w,
        r#" name="{name}" type="{ty}">"#;
        name = XmlText(&node.name),
        ty = match node.node_type {
            NodeType::Node => "NODE",
            NodeType::Joint => "JOINT",
        },
    )?;

    write_indent(w, indent + 1)?;
    write_lines!(w, r#"<matrix sid="transform">{}</matrix>"#; Mat(&node.matrix))?;

    for instance in &node.instances {
        write_instance(w, instance, indent + 1)?;
    }
    for child in &node.children {
        write_node(w, child, indent + 1)?;
    }

    write_indent(w, indent)?;
    write_lines!(w, "</node>";)?;
    Ok(())
}

fn write_instance<W: Write>(w: &mut W, instance: &Instance, indent: u32) -> Result<()> {
    write_indent(w, indent)?;
    match *instance {
        Instance::Camera { ref url } => {
            write_lines!(w, r##"<instance_camera url="#{}"/>"##; url)?;
        }
        Instance::Light { ref url } => {
            write_lines!(w, r##"<instance_light url="#{}"/>"##; url)?;
        }
        Instance::Geometry { ref url, ref materials } => {
            if materials.is_empty() {
                write_lines!(w, r##"<instance_geometry url="#{}"/>"##; url)?;
            } else {
                write_lines!(w, r##"<instance_geometry url="#{}">"##; url)?;
                write_bind_material(w, materials, indent + 1)?;
                write_indent(w, indent)?;
                write_lines!(w, "</instance_geometry>";)?;
            }
        }
        Instance::Controller { ref url, ref skeletons, ref materials } => {
            write_lines!(w, r##"<instance_controller url="#{}">"##; url)?;
            for skel in skeletons {
                write_indent(w, indent + 1)?;
                write_lines!(w, r##"<skeleton>#{}</skeleton>"##; skel)?;
            }
            if !materials.is_empty() {
                write_bind_material(w, materials, indent + 1)?;
            }
            write_indent(w, indent)?;
            write_lines!(w, "</instance_controller>";)?;
        }
    }
    Ok(())
}

fn write_bind_material<W: Write>(w: &mut W, materials: &[MaterialBinding], indent: u32) -> Result<()> {
    write_indent(w, indent)?;
    write_lines!(w, "<bind_material>";)?;
    write_indent(w, indent + 1)?;
    write_lines!(w, "<technique_common>";)?;
    for binding in materials {
        write_indent(w, indent + 2)?;
        match binding.texcoord_set {
            None => {
                write_lines!(w,
                    r##"<instance_material symbol="{symbol}" target="#{target}"/>"##;
                    symbol = binding.symbol, target = binding.target,
                )?;
            }
            Some(set) => {
                write_lines!(w,
                    r##"<instance_material symbol="{symbol}" target="#{target}">"##;
                    symbol = binding.symbol, target = binding.target,
                )?;
                write_indent(w, indent + 3)?;
                write_lines!(w,
                    r##"<bind_vertex_input semantic="CHANNEL0" input_semantic="TEXCOORD" input_set="{}"/>"##;
                    set,
                )?;
                write_indent(w, indent + 2)?;
                write_lines!(w, "</instance_material>";)?;
            }
        }
    }
    write_indent(w, indent + 1)?;
    write_lines!(w, "</technique_common>";)?;
    write_indent(w, indent)?;
    write_lines!(w, "</bind_material>";)?;
    Ok(())
}
