//! DEM projection metadata and its record codec.

use std::io::{Read, Seek, Write};

use crate::quipu::{IStream, OStream};
use crate::util::{DVec3, Resolution, Result};

/// Map-projection georeferencing, present only for DEMs that carry a
/// spatial reference system.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Georeference {
    /// Spatial reference as WKT.
    pub proj_ref: String,
    /// Map coordinates of the raster origin.
    pub model_tie_point: [f64; 2],
    /// Row/column rotation terms of the geotransform.
    pub row_col_rotation: [f64; 2],
}

/// Placement of a DEM raster (or one tile of it) in map space.
#[derive(Clone, Debug, PartialEq)]
pub struct DemProjection {
    pub resolution: Resolution,
    /// Map units per pixel along x and y.
    pub pixel_scale: [f64; 2],

    /// Tile grid this raster was cut from (0x0 when untiled).
    pub tile_definitions: Resolution,
    pub tile_row: u32,
    pub tile_col: u32,
    /// Pixel offset of this raster's origin within the source raster.
    pub xoff: f64,
    pub yoff: f64,
    /// Source-pixel step between adjacent samples (grows as levels coarsen).
    pub dx: f64,
    pub dy: f64,

    pub georeference: Option<Georeference>,
}

impl Default for DemProjection {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            pixel_scale: [0.0, 0.0],
            tile_definitions: Resolution::default(),
            tile_row: 0,
            tile_col: 0,
            xoff: 0.0,
            yoff: 0.0,
            dx: 1.0,
            dy: 1.0,
            georeference: None,
        }
    }
}

impl DemProjection {
    /// Untiled, ungeoreferenced projection with square pixels of `gsd`.
    pub fn planar(resolution: Resolution, gsd: f64) -> Self {
        Self {
            resolution,
            pixel_scale: [gsd, gsd],
            ..Self::default()
        }
    }

    /// Ground sample distance along x and y.
    pub fn gsd_xy(&self) -> [f64; 2] {
        [
            (self.dx * self.pixel_scale[0]).abs(),
            (self.dy * self.pixel_scale[1]).abs(),
        ]
    }

    /// Ground sample distance of the coarser axis.
    pub fn gsd(&self) -> f64 {
        let [gx, gy] = self.gsd_xy();
        gx.max(gy)
    }

    /// Map-space position of sample `(col, row)` at height `z`.
    pub fn pixel_to_world(&self, col: f64, row: f64, z: f32) -> DVec3 {
        let u = self.xoff + col * self.dx;
        let v = self.yoff + row * self.dy;
        let [sx, sy] = self.pixel_scale;
        match &self.georeference {
            None => DVec3::new(u * sx, v * sy, z as f64),
            Some(geo) => {
                let [tx, ty] = geo.model_tie_point;
                let [rx, ry] = geo.row_col_rotation;
                DVec3::new(tx + u * sx + v * rx, ty + u * ry + v * sy, z as f64)
            }
        }
    }

    /// Label like `r2c3of4x4`, empty when untiled.
    pub fn tile_string(&self) -> String {
        if self.tile_definitions.is_empty() {
            return String::new();
        }
        format!(
            "r{}c{}of{}x{}",
            self.tile_row, self.tile_col, self.tile_definitions.height, self.tile_definitions.width
        )
    }

    pub fn write<W: Write + Seek>(&self, out: &mut OStream<W>) -> Result<u64> {
        let mut written = out.write_resolution(self.resolution)?;
        written += out.write_vec(&self.pixel_scale)?;

        written += out.write_resolution(self.tile_definitions)?;
        written += out.write_value(self.tile_row)?;
        written += out.write_value(self.tile_col)?;
        written += out.write_typed_value(self.xoff)?;
        written += out.write_typed_value(self.yoff)?;
        written += out.write_typed_value(self.dx)?;
        written += out.write_typed_value(self.dy)?;

        written += out.write_bool(self.georeference.is_some())?;
        if let Some(geo) = &self.georeference {
            written += out.write_string(&geo.proj_ref)?;
            written += out.write_vec(&geo.model_tie_point)?;
            written += out.write_vec(&geo.row_col_rotation)?;
        }
        Ok(written)
    }

    pub fn read<R: Read + Seek>(s: &mut IStream<R>) -> Result<Self> {
        let resolution = s.read_resolution()?;
        let pixel_scale = s.read_vec::<f64, 2>()?;

        let tile_definitions = s.read_resolution()?;
        let tile_row = s.read_value::<u32>()?;
        let tile_col = s.read_value::<u32>()?;
        let xoff = s.read_typed_value()?;
        let yoff = s.read_typed_value()?;
        let dx = s.read_typed_value()?;
        let dy = s.read_typed_value()?;

        let georeference = if s.read_bool()? {
            Some(Georeference {
                proj_ref: s.read_string()?,
                model_tie_point: s.read_vec()?,
                row_col_rotation: s.read_vec()?,
            })
        } else {
            None
        };

        Ok(Self {
            resolution,
            pixel_scale,
            tile_definitions,
            tile_row,
            tile_col,
            xoff,
            yoff,
            dx,
            dy,
            georeference,
        })
    }
}
