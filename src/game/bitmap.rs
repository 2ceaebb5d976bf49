//! Challenge Bitmap Codec
//!
//! Authored levels and board screenshots travel as 24-bit uncompressed
//! bitmaps: each cell is a 4x4 pixel block, rows stored bottom-up. The
//! block border carries generator placement (the marker triple
//! `(0, 0, 255)` on a border pixel is the local player's start); the block
//! interior carries the cell itself. The first interior pixel of a block's
//! second row encodes the color as 3-bit channel presence (first channel =
//! 4, second = 2, third = 1, summed modulo 7); the cell is alive when the
//! second interior pixel is colored too, and a seed when it is not.
//!
//! All header integers are serialized 4-byte little-endian with explicit
//! arithmetic, never via host byte order. A truncated or malformed file
//! aborts only the load; the world is untouched on failure.

use std::fs;
use std::io;
use std::path::Path;

use crate::game::world::{Cell, Grid, Lifecycle, SlotId, World, WorldError};
use crate::MAX_SLOTS;

/// Pixel data begins here; fixed 54-byte header (14 file + 40 info).
const PIXEL_OFFSET: u32 = 54;

/// Pixels per cell edge.
const BLOCK: usize = 4;

/// Channel triples indexed by 3-bit color code. Index 0 doubles as black
/// and index 7 as the neutral (white) live cell; the code round-trips
/// through the channel-presence rule above.
const PALETTE: [[u8; 3]; 8] = [
    [0, 0, 0],
    [0, 0, 255],
    [0, 255, 0],
    [0, 255, 255],
    [255, 0, 0],
    [255, 0, 255],
    [255, 255, 0],
    [255, 255, 255],
];

/// Errors from reading a challenge bitmap.
#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    /// Underlying file I/O failed.
    #[error("bitmap i/o: {0}")]
    Io(#[from] io::Error),

    /// The file is not a BMP.
    #[error("not a bitmap file")]
    NotABitmap,

    /// The file ends before the pixel data it declares.
    #[error("bitmap is truncated")]
    Truncated,

    /// The declared dimensions cannot describe a board.
    #[error("bitmap does not encode a usable grid")]
    BadDimensions,

    /// The decoded board could not be allocated.
    #[error(transparent)]
    Allocation(#[from] WorldError),
}

/// Write a u32 as 4 little-endian bytes.
fn put_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&[
        (value & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        ((value >> 16) & 0xFF) as u8,
        ((value >> 24) & 0xFF) as u8,
    ]);
}

/// Read a u32 from 4 little-endian bytes.
fn get_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(
        bytes[0] as u32
            | (bytes[1] as u32) << 8
            | (bytes[2] as u32) << 16
            | (bytes[3] as u32) << 24,
    )
}

/// 3-bit color code of a pixel triple.
#[inline]
fn color_code(pixel: &[u8]) -> u8 {
    let mut code = 0u8;
    if pixel[0] != 0 {
        code += 4;
    }
    if pixel[1] != 0 {
        code += 2;
    }
    if pixel[2] != 0 {
        code += 1;
    }
    code % 7
}

/// Is any channel of the triple set?
#[inline]
fn is_colored(pixel: &[u8]) -> bool {
    pixel[0] != 0 || pixel[1] != 0 || pixel[2] != 0
}

/// Save the board as a bitmap.
///
/// With `challenge` set, cells and generators are colored by slot id so
/// the file can be loaded back as a challenge level; otherwise the display
/// palette is used and the file is only a screenshot.
pub fn save_snapshot(world: &World, path: &Path, challenge: bool) -> io::Result<()> {
    let gw = world.grid.width() as usize;
    let gh = world.grid.height() as usize;
    let pixel_w = gw * BLOCK;
    let pixel_h = gh * BLOCK;
    let data_len = (pixel_w * pixel_h * 3) as u32;

    let mut out = Vec::with_capacity(PIXEL_OFFSET as usize + data_len as usize);
    out.extend_from_slice(b"BM");
    put_u32_le(&mut out, PIXEL_OFFSET + data_len);
    put_u32_le(&mut out, 0);
    put_u32_le(&mut out, PIXEL_OFFSET);
    put_u32_le(&mut out, 40);
    put_u32_le(&mut out, pixel_w as u32);
    put_u32_le(&mut out, pixel_h as u32);
    out.extend_from_slice(&[1, 0]); // planes
    out.extend_from_slice(&[24, 0]); // bits per pixel
    put_u32_le(&mut out, 0);
    put_u32_le(&mut out, data_len);
    put_u32_le(&mut out, 2835);
    put_u32_le(&mut out, 2835);
    put_u32_le(&mut out, 0);
    put_u32_le(&mut out, 0);

    // Rows bottom-up: the first file row is the last board row's bottom
    // border.
    for i in (0..pixel_h).rev() {
        for j in 0..pixel_w {
            let (cx, cy) = ((j / BLOCK) as u16, (i / BLOCK) as u16);
            let border = i % BLOCK == 0 || i % BLOCK == 3 || j % BLOCK == 0 || j % BLOCK == 3;

            let palette_index = if border {
                generator_at(world, cx, cy)
                    .map(|slot| {
                        if challenge {
                            slot.as_u8() % 8
                        } else {
                            world.colors[slot.index()] % 8
                        }
                    })
                    .unwrap_or(0)
            } else {
                let code = match world.grid.get(cx, cy) {
                    Cell::Empty => 0,
                    Cell::Seed(c) | Cell::Alive(c) => {
                        if c == SlotId::NEUTRAL {
                            7
                        } else if challenge {
                            c.as_u8() % 7
                        } else {
                            world.colors[c.index()] % 7
                        }
                    }
                };
                // Seeds color only the first interior column; live cells
                // color both, which is what the loader keys on.
                let marker_column = j % BLOCK == 1
                    || (j % BLOCK == 2 && world.grid.get(cx, cy).is_alive());
                if marker_column {
                    code
                } else {
                    0
                }
            };

            out.extend_from_slice(&PALETTE[palette_index as usize]);
        }
    }

    fs::write(path, out)
}

/// First living generator standing on a cell.
fn generator_at(world: &World, x: u16, y: u16) -> Option<SlotId> {
    world
        .roster
        .iter()
        .find(|(_, p)| p.state.is_alive() && p.x == x && p.y == y)
        .map(|(slot, _)| slot)
}

/// Load a challenge bitmap into the world.
///
/// Resizes the grid to the bitmap's dimensions, installs the encoded
/// cells and scores, and moves the local player to the marked start.
/// On any error the world is left exactly as it was.
pub fn load_challenge(world: &mut World, path: &Path) -> Result<(), BitmapError> {
    let data = fs::read(path)?;

    if data.len() < PIXEL_OFFSET as usize || &data[0..2] != b"BM" {
        return Err(BitmapError::NotABitmap);
    }
    let offset = get_u32_le(&data, 10).ok_or(BitmapError::Truncated)? as usize;
    let pixel_w = get_u32_le(&data, 18).ok_or(BitmapError::Truncated)? as usize;
    let pixel_h = get_u32_le(&data, 22).ok_or(BitmapError::Truncated)? as usize;

    let gw = pixel_w / BLOCK;
    let gh = pixel_h / BLOCK;
    if gw == 0 || gh == 0 || gw > 10_000 || gh > 10_000 {
        return Err(BitmapError::BadDimensions);
    }

    let row_len = pixel_w * 3;
    let needed = offset
        .checked_add(row_len.checked_mul(pixel_h).ok_or(BitmapError::BadDimensions)?)
        .ok_or(BitmapError::BadDimensions)?;
    if data.len() < needed {
        return Err(BitmapError::Truncated);
    }

    // Decode into a fresh grid first; the world is only touched on
    // success.
    let mut grid = Grid::new(gw as u16, gh as u16, world.grid.wrap())?;
    let mut scores = [0u32; MAX_SLOTS];
    let mut player_start = (0u16, 0u16);

    for y in 0..gh {
        // The block's second row in file order, counting from the bottom.
        let file_row = (gh - 1 - y) * BLOCK + 1;
        let row_at = offset + file_row * row_len;

        for x in 0..gw {
            let block_at = row_at + x * BLOCK * 3;
            let border = &data[block_at..block_at + 3];
            let color = &data[block_at + 3..block_at + 6];
            let marker = &data[block_at + 6..block_at + 9];

            // The local player's start is a border pixel with only the
            // third channel set.
            if border[0] == 0 && border[1] == 0 && border[2] != 0 {
                player_start = (x as u16, y as u16);
            }

            let code = color_code(color);
            let cell = if is_colored(color) && is_colored(marker) {
                scores[code as usize] += 1;
                Cell::Alive(SlotId::new(code).unwrap_or(SlotId::NEUTRAL))
            } else if code != 0 {
                Cell::Seed(SlotId::new(code).unwrap_or(SlotId::NEUTRAL))
            } else {
                Cell::Empty
            };
            grid.set(x as u16, y as u16, cell);
        }
    }

    world.config.grid_width = gw as u16;
    world.config.grid_height = gh as u16;
    world.grid = grid;
    world.scores = scores;
    world.seeds = [world.config.starting_seeds; MAX_SLOTS];
    world.roster[SlotId::LOCAL].state = Lifecycle::Playing;
    world.roster[SlotId::LOCAL].x = player_start.0;
    world.roster[SlotId::LOCAL].y = player_start.1;
    Ok(())
}
