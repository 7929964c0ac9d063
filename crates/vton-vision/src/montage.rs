//! Batch montage tiling.
//!
//! A montage is a grid of image groups: each row is a list of `[b, c, h, w]`
//! tensors, and the output is one `[b, 3, rows*h, cols*w]` canvas per batch
//! with a 0.5-gray background behind short rows.

use candle_core::{bail, Result, Tensor};

use crate::tensor::display_normalize;

/// Tile rows of batched image tensors into a single batched canvas.
///
/// All tiles must share the same batch size and spatial dimensions.
pub fn tile_rows(rows: &[Vec<Tensor>]) -> Result<Tensor> {
    let first = match rows.iter().flat_map(|r| r.iter()).next() {
        Some(t) => t,
        None => bail!("montage needs at least one tile"),
    };

    let (batch, _, h, w) = display_normalize(first)?.dims4()?;
    let grid_h = rows.len();
    let grid_w = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let (canvas_h, canvas_w) = (grid_h * h, grid_w * w);

    let mut canvas = vec![0.5f32; batch * 3 * canvas_h * canvas_w];

    for (i, row) in rows.iter().enumerate() {
        for (j, tile) in row.iter().enumerate() {
            let tile = display_normalize(tile)?;
            let (tb, tc, th, tw) = tile.dims4()?;
            if (tb, tc, th, tw) != (batch, 3, h, w) {
                bail!(
                    "montage tile ({i},{j}) has shape {:?}, expected {:?}",
                    (tb, tc, th, tw),
                    (batch, 3, h, w)
                );
            }

            let data = tile.flatten_all()?.to_vec1::<f32>()?;
            for b in 0..batch {
                for c in 0..3 {
                    for y in 0..h {
                        let src = ((b * 3 + c) * h + y) * w;
                        let dst = ((b * 3 + c) * canvas_h + i * h + y) * canvas_w + j * w;
                        canvas[dst..dst + w].copy_from_slice(&data[src..src + w]);
                    }
                }
            }
        }
    }

    Tensor::from_vec(canvas, (batch, 3, canvas_h, canvas_w), first.device())
}
