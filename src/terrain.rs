use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};
use noise::{NoiseFn, Perlin};

use crate::{
    config::{GameConfig, TerrainConfig},
    mission::{MissionScoped, MissionState},
};

pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, (build_height_field_system, spawn_lights).chain())
            .add_systems(OnEnter(MissionState::Running), spawn_terrain_system);
    }
}

/// Terrain heights on a square grid centred on the origin.
#[derive(Resource, Clone, Debug)]
pub struct HeightField {
    size: f32,
    resolution: usize,
    heights: Vec<f32>,
}

impl HeightField {
    /// A grid needs at least 2x2 points to interpolate. Missing heights are
    /// padded with the last one given, extra heights are dropped.
    pub fn new(size: f32, resolution: usize, mut heights: Vec<f32>) -> Self {
        let resolution = resolution.max(2);
        let size = if size > 0.0 { size } else { 1.0 };
        let fill = heights.last().copied().unwrap_or(0.0);
        heights.resize(resolution * resolution, fill);
        HeightField {
            size,
            resolution,
            heights,
        }
    }

    /// Perlin fBm heights in `[0, max_height]`.
    pub fn generate(config: &TerrainConfig) -> Self {
        let perlin = Perlin::new(config.seed);
        let resolution = config.resolution.max(2);
        let cell = config.size / (resolution - 1) as f32;

        let mut heights = Vec::with_capacity(resolution * resolution);
        for row in 0..resolution {
            for col in 0..resolution {
                let x = (col as f32 * cell) as f64 * config.height_noise_scale as f64;
                let z = (row as f32 * cell) as f64 * config.height_noise_scale as f64;
                let mut value = 0.0;
                let mut amplitude = 1.0;
                let mut frequency = 1.0;
                for _ in 0..4 {
                    value += amplitude * perlin.get([x * frequency, z * frequency]);
                    amplitude *= 0.5;
                    frequency *= 2.0;
                }
                // 4 octaves sum to at most 1.875
                let normalized = ((value / 1.875) + 1.0) * 0.5;
                heights.push(normalized.clamp(0.0, 1.0) as f32 * config.max_height);
            }
        }

        Self::new(config.size, resolution, heights)
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    fn cell(&self) -> f32 {
        self.size / (self.resolution - 1) as f32
    }

    fn height_at_grid(&self, col: usize, row: usize) -> f32 {
        self.heights[row * self.resolution + col]
    }

    /// World x/z to fractional grid coordinates, clamped to the field.
    fn to_grid(&self, x: f32, z: f32) -> (f32, f32) {
        let half = self.size * 0.5;
        let max = (self.resolution - 1) as f32;
        let gx = ((x + half) / self.cell()).clamp(0.0, max);
        let gz = ((z + half) / self.cell()).clamp(0.0, max);
        (gx, gz)
    }

    /// Bilinear height; positions outside the field use the nearest edge.
    pub fn sample_height(&self, x: f32, z: f32) -> f32 {
        let (gx, gz) = self.to_grid(x, z);
        let last = self.resolution - 1;
        let col = (gx.floor() as usize).min(last - 1);
        let row = (gz.floor() as usize).min(last - 1);
        let tx = gx - col as f32;
        let tz = gz - row as f32;

        let h00 = self.height_at_grid(col, row);
        let h10 = self.height_at_grid(col + 1, row);
        let h01 = self.height_at_grid(col, row + 1);
        let h11 = self.height_at_grid(col + 1, row + 1);

        let near = h00 + (h10 - h00) * tx;
        let far = h01 + (h11 - h01) * tx;
        near + (far - near) * tz
    }

    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let step = self.cell();
        let dx = self.sample_height(x + step, z) - self.sample_height(x - step, z);
        let dz = self.sample_height(x, z + step) - self.sample_height(x, z - step);
        Vec3::new(-dx, 2.0 * step, -dz).normalize()
    }

    /// Angle between the surface normal and straight up.
    pub fn slope_degrees(&self, x: f32, z: f32) -> f32 {
        self.normal_at(x, z).angle_between(Vec3::Y).to_degrees()
    }

    /// Grid point (col, row) in world space.
    fn grid_position(&self, col: usize, row: usize) -> Vec3 {
        let half = self.size * 0.5;
        Vec3::new(
            col as f32 * self.cell() - half,
            self.height_at_grid(col, row),
            row as f32 * self.cell() - half,
        )
    }
}

/// Snow and rock weights for one alphamap cell. They always sum to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    pub snow: f32,
    pub rock: f32,
}

/// Perlin in [-1, 1] remapped to [0, 1].
fn unit_noise(noise: &impl NoiseFn<f64, 2>, x: f64, y: f64) -> f32 {
    ((noise.get([x, y]) + 1.0) * 0.5).clamp(0.0, 1.0) as f32
}

fn splat_for(noise_value: f32, snow_bias: f32) -> Splat {
    let blended = (0.1 + (0.9 - 0.1) * noise_value) * snow_bias;
    if blended >= 0.8 {
        Splat {
            snow: 1.0,
            rock: 0.0,
        }
    } else {
        let snow = blended.clamp(0.0, 1.0);
        Splat {
            snow,
            rock: 1.0 - snow,
        }
    }
}

/// Row-major snow/rock alphamap driven by Perlin noise and biased toward snow.
pub fn randomize_alphamap(
    width: usize,
    height: usize,
    noise_scale: f32,
    snow_bias: f32,
    noise: &impl NoiseFn<f64, 2>,
) -> Vec<Splat> {
    let mut alphamap = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = unit_noise(
                noise,
                x as f64 * noise_scale as f64,
                y as f64 * noise_scale as f64,
            );
            alphamap.push(splat_for(value, snow_bias));
        }
    }
    alphamap
}

const SNOW: [f32; 3] = [0.95, 0.96, 1.0];
const ROCK: [f32; 3] = [0.35, 0.33, 0.32];

fn blend(splat: Splat) -> [f32; 4] {
    [
        SNOW[0] * splat.snow + ROCK[0] * splat.rock,
        SNOW[1] * splat.snow + ROCK[1] * splat.rock,
        SNOW[2] * splat.snow + ROCK[2] * splat.rock,
        1.0,
    ]
}

pub fn build_terrain_mesh(field: &HeightField, alphamap: &[Splat]) -> Mesh {
    let n = field.resolution();
    let mut positions = Vec::with_capacity(n * n);
    let mut normals = Vec::with_capacity(n * n);
    let mut colors = Vec::with_capacity(n * n);

    for row in 0..n {
        for col in 0..n {
            let position = field.grid_position(col, row);
            positions.push(position.to_array());
            normals.push(field.normal_at(position.x, position.z).to_array());
            colors.push(blend(alphamap[row * n + col]));
        }
    }

    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6);
    for row in 0..(n - 1) as u32 {
        for col in 0..(n - 1) as u32 {
            let i = row * n as u32 + col;
            let below = i + n as u32;
            indices.extend_from_slice(&[i, below, i + 1, i + 1, below, below + 1]);
        }
    }

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
        .with_inserted_indices(Indices::U32(indices))
}

fn build_height_field_system(mut commands: Commands, config: Res<GameConfig>) {
    let field = HeightField::generate(&config.terrain);
    info!(
        "Generated {}x{} terrain over {} units",
        field.resolution(),
        field.resolution(),
        field.size()
    );
    commands.insert_resource(field);
}

fn spawn_lights(mut commands: Commands) {
    commands.insert_resource(ClearColor(Color::srgb(0.72, 0.78, 0.85)));
    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(200.0, 400.0, 100.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// The texture is re-rolled every mission, with a fresh seed.
fn spawn_terrain_system(
    mut commands: Commands,
    config: Res<GameConfig>,
    field: Res<HeightField>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let n = field.resolution();
    let noise = Perlin::new(rand::random::<u32>());
    let alphamap = randomize_alphamap(
        n,
        n,
        config.terrain.texture_noise_scale,
        config.terrain.snow_bias,
        &noise,
    );

    commands.spawn((
        MissionScoped,
        Name::new("Terrain"),
        Mesh3d(meshes.add(build_terrain_mesh(&field, &alphamap))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::WHITE,
            perceptual_roughness: 0.9,
            ..default()
        })),
        Transform::default(),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A plane tilted along x: height = x + 50.
    fn ramp() -> HeightField {
        let resolution = 11;
        let size = 100.0;
        let mut heights = Vec::new();
        for _row in 0..resolution {
            for col in 0..resolution {
                heights.push(col as f32 * 10.0);
            }
        }
        HeightField::new(size, resolution, heights)
    }

    #[test]
    fn bilinear_sampling_follows_the_ramp() {
        let field = ramp();
        assert!((field.sample_height(0.0, 0.0) - 50.0).abs() < 1e-4);
        assert!((field.sample_height(-45.0, 10.0) - 5.0).abs() < 1e-4);
        assert!((field.sample_height(12.5, -30.0) - 62.5).abs() < 1e-4);
    }

    #[test]
    fn sampling_outside_clamps_to_edge() {
        let field = ramp();
        assert!((field.sample_height(500.0, 0.0) - 100.0).abs() < 1e-4);
        assert!((field.sample_height(-500.0, 0.0)).abs() < 1e-4);
    }

    #[test]
    fn degenerate_grid_is_padded_to_two_by_two() {
        let field = HeightField::new(10.0, 1, vec![4.0]);
        assert_eq!(field.resolution(), 2);
        assert_eq!(field.sample_height(0.0, 0.0), 4.0);
        assert_eq!(field.sample_height(50.0, -50.0), 4.0);
        assert!(field.slope_degrees(0.0, 0.0) < 0.01);

        let empty = HeightField::new(0.0, 0, Vec::new());
        assert_eq!(empty.sample_height(1.0, 1.0), 0.0);
    }

    #[test]
    fn slope_of_45_degree_ramp() {
        let field = ramp();
        assert!((field.slope_degrees(0.0, 0.0) - 45.0).abs() < 0.01);

        let flat = HeightField::new(100.0, 5, vec![3.0; 25]);
        assert!(flat.slope_degrees(10.0, 10.0) < 0.01);
    }

    #[test]
    fn generated_heights_stay_in_range() {
        let config = TerrainConfig {
            resolution: 17,
            ..default()
        };
        let field = HeightField::generate(&config);
        assert_eq!(field.heights.len(), 17 * 17);
        assert!(field
            .heights
            .iter()
            .all(|h| (0.0..=config.max_height).contains(h)));
    }

    #[test]
    fn alphamap_weights_sum_to_one() {
        let alphamap = randomize_alphamap(16, 8, 0.05, 0.8, &Perlin::new(1));
        assert_eq!(alphamap.len(), 16 * 8);
        for splat in alphamap {
            assert!((splat.snow + splat.rock - 1.0).abs() < 1e-6);
            assert!((0.0..=1.0).contains(&splat.snow));
        }
    }

    #[test]
    fn splat_thresholds() {
        // Bias 0.8 caps the blend at 0.72, so full snow never happens.
        let top = splat_for(1.0, 0.8);
        assert!((top.snow - 0.72).abs() < 1e-6);

        let bottom = splat_for(0.0, 0.8);
        assert!((bottom.snow - 0.08).abs() < 1e-6);

        assert_eq!(
            splat_for(1.0, 1.0),
            Splat {
                snow: 1.0,
                rock: 0.0
            }
        );
    }

    #[test]
    fn mesh_has_a_vertex_per_grid_point() {
        let field = ramp();
        let alphamap = randomize_alphamap(11, 11, 0.05, 0.8, &Perlin::new(2));
        let mesh = build_terrain_mesh(&field, &alphamap);
        assert_eq!(mesh.count_vertices(), 121);
        assert_eq!(mesh.indices().map(|i| i.len()), Some(10 * 10 * 6));
    }
}
