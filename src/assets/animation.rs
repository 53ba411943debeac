use crate::scene::{NodeId, SceneGraph};
use gltf::animation::util::ReadOutputs;
use gltf::animation::{Interpolation as GltfInterpolation, Property};
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValues {
    Translations(Vec<Vec3>),
    Rotations(Vec<Quat>),
    Scales(Vec<Vec3>),
}

impl ChannelValues {
    fn len(&self) -> usize {
        match self {
            ChannelValues::Translations(values) | ChannelValues::Scales(values) => values.len(),
            ChannelValues::Rotations(values) => values.len(),
        }
    }
}

/// One animated TRS property of one asset node.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    /// Index into the asset's node list.
    pub target: usize,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
}

pub(crate) fn parse_clips(document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Vec<AnimationClip> {
    let mut clips = Vec::new();
    for (anim_index, animation) in document.animations().enumerate() {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation_{anim_index}"));

        let mut channels = Vec::new();
        for channel in animation.channels() {
            let target = channel.target().node().index();
            let (interpolation, cubic) = match channel.sampler().interpolation() {
                GltfInterpolation::Step => (Interpolation::Step, false),
                GltfInterpolation::Linear => (Interpolation::Linear, false),
                GltfInterpolation::CubicSpline => {
                    log::warn!(
                        "Animation '{}' uses cubic-spline interpolation on node {}; tangents dropped",
                        name,
                        target
                    );
                    (Interpolation::Linear, true)
                }
            };

            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(inputs) = reader.read_inputs() else {
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            if times.is_empty() {
                continue;
            }
            let Some(outputs) = reader.read_outputs() else {
                continue;
            };

            let values = match (channel.target().property(), outputs) {
                (Property::Translation, ReadOutputs::Translations(values)) => {
                    ChannelValues::Translations(spline_values(values.map(Vec3::from_array).collect(), cubic))
                }
                (Property::Scale, ReadOutputs::Scales(values)) => {
                    ChannelValues::Scales(spline_values(values.map(Vec3::from_array).collect(), cubic))
                }
                (Property::Rotation, ReadOutputs::Rotations(rotations)) => ChannelValues::Rotations(spline_values(
                    rotations.into_f32().map(|r| Quat::from_array(r).normalize()).collect(),
                    cubic,
                )),
                // Morph weights are not animated by the viewer.
                _ => continue,
            };
            if values.len() != times.len() {
                log::warn!(
                    "Animation '{}' channel on node {} has {} keys but {} values; skipped",
                    name,
                    target,
                    times.len(),
                    values.len()
                );
                continue;
            }
            channels.push(AnimationChannel {
                target,
                interpolation,
                times,
                values,
            });
        }

        let duration = channels
            .iter()
            .filter_map(|channel| channel.times.last().copied())
            .fold(0.0_f32, f32::max);
        clips.push(AnimationClip {
            name,
            duration,
            channels,
        });
    }
    clips
}

/// Cubic-spline outputs store (in-tangent, value, out-tangent) per key.
fn spline_values<T: Copy>(values: Vec<T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.chunks_exact(3).map(|key| key[1]).collect()
    } else {
        values
    }
}

/// Segment containing `time` and the blend factor inside it.
fn locate(times: &[f32], time: f32) -> (usize, usize, f32) {
    let last = times.len() - 1;
    if time <= times[0] {
        return (0, 0, 0.0);
    }
    if time >= times[last] {
        return (last, last, 0.0);
    }
    let next = times.partition_point(|&t| t <= time);
    let prev = next - 1;
    let span = times[next] - times[prev];
    let factor = if span > f32::EPSILON {
        (time - times[prev]) / span
    } else {
        0.0
    };
    (prev, next, factor)
}

impl AnimationChannel {
    fn apply(&self, time: f32, scene: &mut SceneGraph, node: NodeId) {
        let Some(target) = scene.node_mut(node) else {
            return;
        };
        let (prev, next, factor) = locate(&self.times, time);
        let factor = match self.interpolation {
            Interpolation::Step => 0.0,
            Interpolation::Linear => factor,
        };
        match &self.values {
            ChannelValues::Translations(values) => {
                target.transform.translation = values[prev].lerp(values[next], factor);
            }
            ChannelValues::Scales(values) => {
                target.transform.scale = values[prev].lerp(values[next], factor);
            }
            ChannelValues::Rotations(values) => {
                target.transform.rotation = values[prev].slerp(values[next], factor).normalize();
            }
        }
    }
}

/// Plays a single clip on a loop against the nodes it was bound to.
pub struct AnimationMixer {
    clip: AnimationClip,
    targets: Vec<Option<NodeId>>,
    time: f32,
}

impl AnimationMixer {
    /// `node_map[i]` is the scene node instantiated for asset node `i`.
    pub fn new(clip: AnimationClip, node_map: &[Option<NodeId>]) -> Self {
        let targets = clip
            .channels
            .iter()
            .map(|channel| node_map.get(channel.target).copied().flatten())
            .collect();
        Self {
            clip,
            targets,
            time: 0.0,
        }
    }

    pub fn clip_name(&self) -> &str {
        &self.clip.name
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn advance(&mut self, dt: f32, scene: &mut SceneGraph) {
        if !dt.is_finite() || dt < 0.0 {
            return;
        }
        self.time = if self.clip.duration > 0.0 {
            (self.time + dt) % self.clip.duration
        } else {
            0.0
        };
        for (channel, target) in self.clip.channels.iter().zip(&self.targets) {
            if let Some(node) = *target {
                channel.apply(self.time, scene, node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;

    fn clip(interpolation: Interpolation) -> AnimationClip {
        AnimationClip {
            name: "Wave".to_string(),
            duration: 2.0,
            channels: vec![AnimationChannel {
                target: 0,
                interpolation,
                times: vec![0.0, 2.0],
                values: ChannelValues::Translations(vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]),
            }],
        }
    }

    fn scene_with_node() -> (SceneGraph, NodeId) {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let node = scene.add_child(root, "arm", Transform::IDENTITY).unwrap();
        (scene, node)
    }

    #[test]
    fn linear_channel_interpolates_and_loops() {
        let (mut scene, node) = scene_with_node();
        let mut mixer = AnimationMixer::new(clip(Interpolation::Linear), &[Some(node)]);
        mixer.advance(0.5, &mut scene);
        assert!((scene.node(node).unwrap().transform.translation.x - 0.5).abs() < 1e-5);
        mixer.advance(2.0, &mut scene);
        assert!((mixer.time() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn step_channel_holds_previous_key() {
        let (mut scene, node) = scene_with_node();
        let mut mixer = AnimationMixer::new(clip(Interpolation::Step), &[Some(node)]);
        mixer.advance(1.9, &mut scene);
        assert_eq!(scene.node(node).unwrap().transform.translation, Vec3::ZERO);
    }

    #[test]
    fn unbound_targets_are_ignored() {
        let (mut scene, node) = scene_with_node();
        let mut mixer = AnimationMixer::new(clip(Interpolation::Linear), &[]);
        mixer.advance(1.0, &mut scene);
        assert_eq!(scene.node(node).unwrap().transform, Transform::IDENTITY);
    }

    #[test]
    fn cubic_outputs_keep_middle_value() {
        let values = vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE, Vec3::NEG_X, Vec3::ZERO];
        assert_eq!(spline_values(values, true), vec![Vec3::Y, Vec3::NEG_X]);
    }
}
