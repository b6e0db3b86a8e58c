//! Per-context calibration tables.
//!
//! A calibration set is a fixed array of slots indexed by [`CalibrationId`]. Each
//! present slot describes a `rows x cols` LUT whose cells are `width` bytes wide
//! and points into a shared byte arena. Tables are immutable during normal
//! operation; the calibration command may overwrite a table's bytes wholesale
//! provided the byte count matches exactly, so the arena never has to grow after
//! the set is built.

use core::fmt;

use heapless::Vec;

use crate::math::ModulationEntry;

pub mod defaults;
mod ids;

pub use ids::{CALIBRATION_TOTAL_SIZE, CalibrationId};

/// Bytes available for LUT contents in one context.
pub const CALIBRATION_ARENA_BYTES: usize = 8 * 1024;

/// Per-table header size used by [`CalibrationSet::export`].
pub const EXPORT_HEADER_BYTES: usize = 6;

/// Geometry of a single LUT.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LutShape {
    pub rows: u16,
    pub cols: u16,
    pub width: u8,
}

impl LutShape {
    #[must_use]
    pub const fn new(rows: u16, cols: u16, width: u8) -> Self {
        Self { rows, cols, width }
    }

    /// Size in bytes of a table with this shape.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        self.rows as usize * self.cols as usize * self.width as usize
    }

    /// Number of cells.
    #[must_use]
    pub const fn cells(self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

/// Failures reported by calibration accessors and updates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationError {
    /// No table is registered under the identifier.
    NotExists(CalibrationId),
    /// Supplied byte count differs from the declared table size.
    WrongSize { expected: usize, actual: usize },
    /// The arena cannot hold another table.
    ArenaFull,
    /// A table was re-registered with a different shape.
    ShapeMismatch(CalibrationId),
    /// Serialized calibration data is truncated or malformed.
    Malformed,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Slot {
    shape: LutShape,
    offset: usize,
}

/// Indexed collection of calibration LUTs owned by a context.
#[derive(Clone)]
pub struct CalibrationSet {
    slots: [Option<Slot>; CALIBRATION_TOTAL_SIZE],
    arena: Vec<u8, CALIBRATION_ARENA_BYTES>,
}

impl CalibrationSet {
    /// Creates a set with every slot empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; CALIBRATION_TOTAL_SIZE],
            arena: Vec::new(),
        }
    }

    /// Registers a table. Re-registering an identifier overwrites it in place
    /// when the shape matches.
    pub fn insert(
        &mut self,
        id: CalibrationId,
        shape: LutShape,
        bytes: &[u8],
    ) -> Result<(), CalibrationError> {
        if bytes.len() != shape.byte_len() {
            return Err(CalibrationError::WrongSize {
                expected: shape.byte_len(),
                actual: bytes.len(),
            });
        }

        if let Some(slot) = self.slots[id.index()] {
            if slot.shape != shape {
                return Err(CalibrationError::ShapeMismatch(id));
            }
            self.arena[slot.offset..slot.offset + bytes.len()].copy_from_slice(bytes);
            return Ok(());
        }

        let offset = self.arena.len();
        self.arena
            .extend_from_slice(bytes)
            .map_err(|_| CalibrationError::ArenaFull)?;
        self.slots[id.index()] = Some(Slot { shape, offset });
        Ok(())
    }

    /// Registers a one-row table of bytes.
    pub fn insert_u8(&mut self, id: CalibrationId, values: &[u8]) -> Result<(), CalibrationError> {
        let shape = LutShape::new(1, cells_len(values.len())?, 1);
        self.insert(id, shape, values)
    }

    /// Registers a one-row table of little-endian `u16` cells.
    pub fn insert_u16(
        &mut self,
        id: CalibrationId,
        values: &[u16],
    ) -> Result<(), CalibrationError> {
        let shape = LutShape::new(1, cells_len(values.len())?, 2);
        self.insert_cells(id, shape, values.iter().map(|value| u32::from(*value)))
    }

    /// Registers a one-row table of little-endian `u32` cells.
    pub fn insert_u32(
        &mut self,
        id: CalibrationId,
        values: &[u32],
    ) -> Result<(), CalibrationError> {
        let shape = LutShape::new(1, cells_len(values.len())?, 4);
        self.insert_cells(id, shape, values.iter().copied())
    }

    /// Registers a `rows x cols` table of little-endian `u16` cells.
    pub fn insert_u16_matrix(
        &mut self,
        id: CalibrationId,
        rows: u16,
        cols: u16,
        values: &[u16],
    ) -> Result<(), CalibrationError> {
        let shape = LutShape::new(rows, cols, 2);
        self.insert_cells(id, shape, values.iter().map(|value| u32::from(*value)))
    }

    /// Registers a modulation curve as `(x, y)` pairs of `u16`.
    pub fn insert_modulation(
        &mut self,
        id: CalibrationId,
        knots: &[ModulationEntry],
    ) -> Result<(), CalibrationError> {
        let shape = LutShape::new(cells_len(knots.len())?, 2, 2);
        self.insert_cells(
            id,
            shape,
            knots
                .iter()
                .flat_map(|knot| [u32::from(knot.x), u32::from(knot.y)]),
        )
    }

    fn insert_cells<I>(
        &mut self,
        id: CalibrationId,
        shape: LutShape,
        cells: I,
    ) -> Result<(), CalibrationError>
    where
        I: Iterator<Item = u32>,
    {
        let mut staging: Vec<u8, 512> = Vec::new();
        let width = usize::from(shape.width);
        for cell in cells {
            let bytes = cell.to_le_bytes();
            staging
                .extend_from_slice(&bytes[..width])
                .map_err(|_| CalibrationError::ArenaFull)?;
        }
        self.insert(id, shape, &staging)
    }

    /// Returns `true` when a table is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: CalibrationId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Declared geometry of a table.
    #[must_use]
    pub fn shape(&self, id: CalibrationId) -> Option<LutShape> {
        self.slots[id.index()].map(|slot| slot.shape)
    }

    /// Raw bytes of a table.
    #[must_use]
    pub fn bytes(&self, id: CalibrationId) -> Option<&[u8]> {
        self.slots[id.index()]
            .map(|slot| &self.arena[slot.offset..slot.offset + slot.shape.byte_len()])
    }

    /// Replaces a table's bytes. The byte count must equal the declared size.
    pub fn update(&mut self, id: CalibrationId, data: &[u8]) -> Result<(), CalibrationError> {
        let slot = self.slots[id.index()].ok_or(CalibrationError::NotExists(id))?;
        let expected = slot.shape.byte_len();
        if data.len() != expected {
            return Err(CalibrationError::WrongSize {
                expected,
                actual: data.len(),
            });
        }
        self.arena[slot.offset..slot.offset + expected].copy_from_slice(data);
        Ok(())
    }

    /// Copies a table into `out`, whose length must equal the declared size.
    pub fn read_into(&self, id: CalibrationId, out: &mut [u8]) -> Result<usize, CalibrationError> {
        let bytes = self.bytes(id).ok_or(CalibrationError::NotExists(id))?;
        if out.len() != bytes.len() {
            return Err(CalibrationError::WrongSize {
                expected: bytes.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Reads cell `index` (row-major) widened to `u32`.
    #[must_use]
    pub fn cell(&self, id: CalibrationId, index: usize) -> Option<u32> {
        let slot = self.slots[id.index()]?;
        if index >= slot.shape.cells() {
            return None;
        }
        let width = usize::from(slot.shape.width);
        let start = slot.offset + index * width;
        let mut buf = [0u8; 4];
        buf[..width.min(4)].copy_from_slice(&self.arena[start..start + width.min(4)]);
        Some(u32::from_le_bytes(buf))
    }

    /// Reads cell `index`, falling back to `default` when absent.
    #[must_use]
    pub fn cell_or(&self, id: CalibrationId, index: usize, default: u32) -> u32 {
        self.cell(id, index).unwrap_or(default)
    }

    /// Iterates every cell of a table widened to `u32`. Absent tables yield nothing.
    pub fn cells(&self, id: CalibrationId) -> impl Iterator<Item = u32> + '_ {
        let count = self.shape(id).map_or(0, LutShape::cells);
        (0..count).filter_map(move |index| self.cell(id, index))
    }

    /// Iterates a modulation curve stored as `(x, y)` pairs.
    pub fn modulation(&self, id: CalibrationId) -> impl Iterator<Item = ModulationEntry> + '_ {
        let rows = self
            .shape(id)
            .filter(|shape| shape.cols == 2)
            .map_or(0, |shape| usize::from(shape.rows));
        (0..rows).filter_map(move |row| {
            let x = u16::try_from(self.cell(id, row * 2)?).ok()?;
            let y = u16::try_from(self.cell(id, row * 2 + 1)?).ok()?;
            Some(ModulationEntry::new(x, y))
        })
    }

    /// Number of rows, as used by modulation lookups.
    #[must_use]
    pub fn rows(&self, id: CalibrationId) -> usize {
        self.shape(id).map_or(0, |shape| usize::from(shape.rows))
    }

    /// Number of registered tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Bytes required by [`CalibrationSet::export`].
    #[must_use]
    pub fn export_len(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|slot| EXPORT_HEADER_BYTES + slot.shape.byte_len())
            .sum()
    }

    /// Serializes every table as `id, width, rows(le16), cols(le16), bytes`.
    pub fn export(&self, out: &mut [u8]) -> Result<usize, CalibrationError> {
        let needed = self.export_len();
        if out.len() < needed {
            return Err(CalibrationError::WrongSize {
                expected: needed,
                actual: out.len(),
            });
        }

        let mut cursor = 0;
        for id in CalibrationId::all() {
            let Some(slot) = self.slots[id.index()] else {
                continue;
            };
            let rows = slot.shape.rows.to_le_bytes();
            let cols = slot.shape.cols.to_le_bytes();
            out[cursor..cursor + EXPORT_HEADER_BYTES].copy_from_slice(&[
                id.raw(),
                slot.shape.width,
                rows[0],
                rows[1],
                cols[0],
                cols[1],
            ]);
            cursor += EXPORT_HEADER_BYTES;
            let len = slot.shape.byte_len();
            out[cursor..cursor + len].copy_from_slice(&self.arena[slot.offset..slot.offset + len]);
            cursor += len;
        }
        Ok(cursor)
    }

    /// Applies data produced by [`CalibrationSet::export`]. Every record must
    /// name an existing table with an identical shape; nothing is written unless
    /// the whole buffer validates.
    pub fn import(&mut self, data: &[u8]) -> Result<usize, CalibrationError> {
        let mut applied = 0;
        for pass in [false, true] {
            let mut cursor = 0;
            applied = 0;
            while cursor < data.len() {
                let header = data
                    .get(cursor..cursor + EXPORT_HEADER_BYTES)
                    .ok_or(CalibrationError::Malformed)?;
                let id = CalibrationId::new(header[0]).ok_or(CalibrationError::Malformed)?;
                let shape = LutShape::new(
                    u16::from_le_bytes([header[2], header[3]]),
                    u16::from_le_bytes([header[4], header[5]]),
                    header[1],
                );
                cursor += EXPORT_HEADER_BYTES;
                let body = data
                    .get(cursor..cursor + shape.byte_len())
                    .ok_or(CalibrationError::Malformed)?;
                cursor += shape.byte_len();

                match self.shape(id) {
                    Some(existing) if existing == shape => {}
                    Some(_) => return Err(CalibrationError::ShapeMismatch(id)),
                    None => return Err(CalibrationError::NotExists(id)),
                }

                if pass {
                    self.update(id, body)?;
                }
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn cells_len(len: usize) -> Result<u16, CalibrationError> {
    u16::try_from(len).map_err(|_| CalibrationError::ArenaFull)
}

impl Default for CalibrationSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CalibrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalibrationSet")
            .field("tables", &self.table_count())
            .field("arena_bytes", &self.arena.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_requires_exact_size() {
        let mut set = CalibrationSet::new();
        set.insert_u16(CalibrationId::SHARP_FR_CONFIG, &[1, 2, 3])
            .expect("insert");

        let short = [0u8; 5];
        assert_eq!(
            set.update(CalibrationId::SHARP_FR_CONFIG, &short),
            Err(CalibrationError::WrongSize {
                expected: 6,
                actual: 5
            })
        );
        assert_eq!(set.cell(CalibrationId::SHARP_FR_CONFIG, 2), Some(3));

        set.update(CalibrationId::SHARP_FR_CONFIG, &[9, 0, 8, 0, 7, 0])
            .expect("exact update");
        assert_eq!(
            set.cells(CalibrationId::SHARP_FR_CONFIG)
                .collect::<Vec<u32, 4>>()
                .as_slice(),
            &[9, 8, 7]
        );
    }

    #[test]
    fn tables_beyond_the_arena_are_rejected() {
        let mut set = CalibrationSet::new();
        let shape = LutShape {
            rows: 1,
            cols: 5_000,
            width: 1,
        };
        let bytes = [0u8; 5_000];
        set.insert(CalibrationId::SHARP_FR_CONFIG, shape, &bytes)
            .expect("first table fits");
        assert_eq!(
            set.insert(CalibrationId::AE_CONTROL, shape, &bytes),
            Err(CalibrationError::ArenaFull)
        );
        assert!(!set.contains(CalibrationId::AE_CONTROL));
    }

    #[test]
    fn missing_table_reports_not_exists() {
        let mut set = CalibrationSet::new();
        assert_eq!(
            set.update(CalibrationId::AE_CONTROL, &[]),
            Err(CalibrationError::NotExists(CalibrationId::AE_CONTROL))
        );
        assert_eq!(set.modulation(CalibrationId::SINTER_STRENGTH).count(), 0);
    }

    #[test]
    fn modulation_tables_decode_pairs() {
        let mut set = CalibrationSet::new();
        let knots = [ModulationEntry::new(0, 10), ModulationEntry::new(512, 300)];
        set.insert_modulation(CalibrationId::SINTER_STRENGTH, &knots)
            .expect("insert");

        let decoded: Vec<ModulationEntry, 4> = set.modulation(CalibrationId::SINTER_STRENGTH).collect();
        assert_eq!(decoded.as_slice(), &knots);
        assert_eq!(set.rows(CalibrationId::SINTER_STRENGTH), 2);
    }

    #[test]
    fn export_then_import_restores_changed_tables() {
        let mut set = CalibrationSet::new();
        set.insert_u32(CalibrationId::AE_CONTROL, &[1, 2, 3]).expect("insert");
        set.insert_u8(CalibrationId::IRIDIX_AVG_COEF, &[15]).expect("insert");

        let mut buffer = [0u8; 64];
        let written = set.export(&mut buffer).expect("export");
        assert_eq!(written, set.export_len());

        set.update(CalibrationId::IRIDIX_AVG_COEF, &[1]).expect("update");
        let applied = set.import(&buffer[..written]).expect("import");
        assert_eq!(applied, 2);
        assert_eq!(set.cell(CalibrationId::IRIDIX_AVG_COEF, 0), Some(15));
    }

    #[test]
    fn import_rejects_unknown_tables_without_writing() {
        let mut source = CalibrationSet::new();
        source.insert_u8(CalibrationId::IRIDIX_AVG_COEF, &[15]).expect("insert");
        source.insert_u8(CalibrationId::AWB_AVG_COEF, &[3]).expect("insert");
        let mut buffer = [0u8; 32];
        let written = source.export(&mut buffer).expect("export");

        let mut target = CalibrationSet::new();
        target.insert_u8(CalibrationId::IRIDIX_AVG_COEF, &[1]).expect("insert");
        assert_eq!(
            target.import(&buffer[..written]),
            Err(CalibrationError::NotExists(CalibrationId::AWB_AVG_COEF))
        );
        assert_eq!(target.cell(CalibrationId::IRIDIX_AVG_COEF, 0), Some(1));
    }
}
