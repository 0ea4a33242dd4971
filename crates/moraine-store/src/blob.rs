//! The blob layer: values behind a bounded reference area.
//!
//! Every value stored in a leaf is a *reference area* of at most
//! [`MAX_REF_LEN`] bytes. Small values live inline in the area; larger ones
//! live in extent blocks held by the [`BlockStore`], with the area encoding
//! the chain of block ids and the total size.
//!
//! # Reference-area format
//!
//! ```text
//! inline:    ┌──────┬────────────┬─────────────┐
//!            │ 0x00 │ len u16 LE │ payload     │   3 + len bytes, len ≤ 248
//!            └──────┴────────────┴─────────────┘
//! external:  ┌──────┬──────────────┬─────────┬──────────────┬─────────────┐
//!            │ 0x01 │ total u64 LE │ depth u8│ count u16 LE │ id u64 LE × │
//!            └──────┴──────────────┴─────────┴──────────────┴─────────────┘
//! ```
//!
//! At depth 0 the listed ids are data blocks of [`BLOCK_SIZE`] bytes (the
//! last one partial). At depth 1 they are index blocks, each packing data
//! block ids as u64 LE. One indirection level bounds values at roughly
//! 60 MB, far beyond any document this table accepts.
//!
//! The area is always exactly [`MAX_REF_LEN`] bytes; unused tail bytes are
//! zero. Block payloads carry a CRC32 so a lost or bit-flipped extent
//! surfaces as a typed error instead of a silent bad decode.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::slice::Transaction;
use crate::{BLOCK_SIZE, MAX_REF_LEN};

const INLINE_TAG: u8 = 0x00;
const EXTERNAL_TAG: u8 = 0x01;

const INLINE_HEADER: usize = 3;
const INLINE_MAX: usize = MAX_REF_LEN - INLINE_HEADER;

const EXTERNAL_HEADER: usize = 1 + 8 + 1 + 2;
const MAX_DIRECT_BLOCKS: usize = (MAX_REF_LEN - EXTERNAL_HEADER) / 8;
const IDS_PER_INDEX_BLOCK: usize = BLOCK_SIZE / 8;

// ============================================================================
// Block store
// ============================================================================

/// Identifier of one extent block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u64);

impl Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Block {
    payload: Vec<u8>,
    checksum: u32,
}

#[derive(Debug, Default)]
struct BlockStoreInner {
    next_id: u64,
    blocks: HashMap<u64, Block>,
}

/// Extent storage shared by every slice of one table store.
#[derive(Debug, Default)]
pub struct BlockStore {
    inner: Mutex<BlockStoreInner>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated blocks. Deleting a value must return this to
    /// where it was before the value was written.
    pub fn live_blocks(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    fn allocate(&self, payload: Vec<u8>) -> BlockId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let checksum = crc32fast::hash(&payload);
        inner.blocks.insert(id, Block { payload, checksum });
        BlockId(id)
    }

    fn read(&self, id: BlockId) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let block = inner.blocks.get(&id.0).ok_or(StoreError::MissingBlock(id))?;
        if crc32fast::hash(&block.payload) != block.checksum {
            return Err(StoreError::BlockChecksumMismatch(id));
        }
        Ok(block.payload.clone())
    }

    fn free(&self, id: BlockId) {
        let removed = self.inner.lock().unwrap().blocks.remove(&id.0);
        debug_assert!(removed.is_some(), "double free of extent block {id}");
    }
}

// ============================================================================
// Reference-area parsing
// ============================================================================

#[derive(Debug)]
enum RefLayout {
    Inline { len: usize },
    External { total: u64, depth: u8, ids: Vec<BlockId> },
}

fn parse_ref(area: &[u8]) -> Result<RefLayout, StoreError> {
    match area.first() {
        Some(&INLINE_TAG) => {
            if area.len() < INLINE_HEADER {
                return Err(StoreError::CorruptedRef("truncated inline header".into()));
            }
            let len = u16::from_le_bytes([area[1], area[2]]) as usize;
            if len > INLINE_MAX || INLINE_HEADER + len > area.len() {
                return Err(StoreError::CorruptedRef(format!(
                    "inline length {len} exceeds reference area"
                )));
            }
            Ok(RefLayout::Inline { len })
        }
        Some(&EXTERNAL_TAG) => {
            if area.len() < EXTERNAL_HEADER {
                return Err(StoreError::CorruptedRef("truncated external header".into()));
            }
            let total = u64::from_le_bytes(area[1..9].try_into().unwrap());
            let depth = area[9];
            if depth > 1 {
                return Err(StoreError::CorruptedRef(format!(
                    "unsupported chain depth {depth}"
                )));
            }
            let count = u16::from_le_bytes([area[10], area[11]]) as usize;
            if EXTERNAL_HEADER + 8 * count > area.len() {
                return Err(StoreError::CorruptedRef(format!(
                    "{count} block ids exceed reference area"
                )));
            }
            let ids = area[EXTERNAL_HEADER..EXTERNAL_HEADER + 8 * count]
                .chunks_exact(8)
                .map(|c| BlockId(u64::from_le_bytes(c.try_into().unwrap())))
                .collect();
            Ok(RefLayout::External { total, depth, ids })
        }
        _ => Err(StoreError::CorruptedRef("unknown reference tag".into())),
    }
}

/// Whether a reference area fits in `available` on-leaf bytes.
pub fn ref_fits(area: &[u8], available: usize) -> bool {
    parse_ref(area).is_ok_and(|layout| ref_size_of(&layout) <= available)
}

fn ref_size_of(layout: &RefLayout) -> usize {
    match layout {
        RefLayout::Inline { len } => INLINE_HEADER + len,
        RefLayout::External { ids, .. } => EXTERNAL_HEADER + 8 * ids.len(),
    }
}

fn data_block_ids(
    layout: &RefLayout,
    blocks: &BlockStore,
) -> Result<Vec<BlockId>, StoreError> {
    match layout {
        RefLayout::Inline { .. } => Ok(vec![]),
        RefLayout::External { depth: 0, ids, .. } => Ok(ids.clone()),
        RefLayout::External { ids, .. } => {
            let mut data_ids = Vec::new();
            for &index_id in ids {
                let payload = blocks.read(index_id)?;
                for chunk in payload.chunks_exact(8) {
                    data_ids.push(BlockId(u64::from_le_bytes(chunk.try_into().unwrap())));
                }
            }
            Ok(data_ids)
        }
    }
}

fn read_content(area: &[u8], blocks: &BlockStore) -> Result<Vec<u8>, StoreError> {
    let layout = parse_ref(area)?;
    match &layout {
        RefLayout::Inline { len } => Ok(area[INLINE_HEADER..INLINE_HEADER + len].to_vec()),
        RefLayout::External { total, .. } => {
            let mut content = Vec::with_capacity(*total as usize);
            for id in data_block_ids(&layout, blocks)? {
                content.extend_from_slice(&blocks.read(id)?);
            }
            if (content.len() as u64) < *total {
                return Err(StoreError::CorruptedRef(format!(
                    "extents hold {} bytes but the reference claims {total}",
                    content.len()
                )));
            }
            content.truncate(*total as usize);
            Ok(content)
        }
    }
}

// ============================================================================
// Leaf value
// ============================================================================

/// The value stored at one key: a zero-padded reference area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafValue {
    area: Vec<u8>,
}

impl LeafValue {
    /// A fresh zero-filled reference area (an empty inline blob).
    pub fn new_zeroed() -> Self {
        Self {
            area: vec![0; MAX_REF_LEN],
        }
    }

    pub fn ref_area(&self) -> &[u8] {
        &self.area
    }

    /// Meaningful bytes at the front of the area.
    pub fn inline_size(&self) -> Result<usize, StoreError> {
        parse_ref(&self.area).map(|l| ref_size_of(&l))
    }

    /// Total size of the value readable through the blob.
    pub fn value_size(&self) -> Result<u64, StoreError> {
        match parse_ref(&self.area)? {
            RefLayout::Inline { len } => Ok(len as u64),
            RefLayout::External { total, .. } => Ok(total),
        }
    }

    /// Reads the whole value.
    pub fn read_all(&self, txn: &Transaction) -> Result<Vec<u8>, StoreError> {
        read_content(&self.area, txn.blocks())
    }

    /// Verifies that the reference decodes, every referenced extent is
    /// present and passes its checksum, and the sizes agree.
    pub fn deep_check(&self, txn: &Transaction) -> Result<(), StoreError> {
        let content = self.read_all(txn)?;
        let claimed = self.value_size()?;
        if content.len() as u64 != claimed {
            return Err(StoreError::CorruptedRef(format!(
                "readable size {} disagrees with reference size {claimed}",
                content.len()
            )));
        }
        Ok(())
    }

    /// Opens the value for mutation through the blob interface.
    pub fn blob(&mut self) -> Blob<'_> {
        Blob { area: &mut self.area }
    }
}

// ============================================================================
// Blob mutation
// ============================================================================

/// Exclusive handle for growing, writing, and clearing a value's blob.
#[derive(Debug)]
pub struct Blob<'a> {
    area: &'a mut Vec<u8>,
}

impl Blob<'_> {
    pub fn value_size(&self) -> Result<u64, StoreError> {
        match parse_ref(self.area)? {
            RefLayout::Inline { len } => Ok(len as u64),
            RefLayout::External { total, .. } => Ok(total),
        }
    }

    /// Grows the blob by `len` zero bytes at the end.
    pub fn append_region(&mut self, txn: &Transaction, len: u64) -> Result<(), StoreError> {
        let mut content = read_content(self.area, txn.blocks())?;
        content.resize(content.len() + len as usize, 0);
        self.store_content(txn, content)
    }

    /// Overwrites `data.len()` bytes at `offset` within the allocated region.
    pub fn write_at(&mut self, txn: &Transaction, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let mut content = read_content(self.area, txn.blocks())?;
        let end = offset + data.len() as u64;
        if end > content.len() as u64 {
            return Err(StoreError::WriteOutOfRegion {
                offset,
                len: data.len() as u64,
                size: content.len() as u64,
            });
        }
        content[offset as usize..end as usize].copy_from_slice(data);
        self.store_content(txn, content)
    }

    /// Releases every referenced extent and resets to the empty blob.
    pub fn clear(&mut self, txn: &Transaction) -> Result<(), StoreError> {
        self.free_extents(txn)?;
        self.area.clear();
        self.area.resize(MAX_REF_LEN, 0);
        Ok(())
    }

    fn free_extents(&mut self, txn: &Transaction) -> Result<(), StoreError> {
        let layout = parse_ref(self.area)?;
        for id in data_block_ids(&layout, txn.blocks())? {
            txn.blocks().free(id);
        }
        if let RefLayout::External { depth: 1, ids, .. } = layout {
            for id in ids {
                txn.blocks().free(id);
            }
        }
        Ok(())
    }

    /// Rebuilds the reference area (and extents) to hold `content`.
    fn store_content(&mut self, txn: &Transaction, content: Vec<u8>) -> Result<(), StoreError> {
        self.free_extents(txn)?;
        self.area.clear();

        if content.len() <= INLINE_MAX {
            self.area.push(INLINE_TAG);
            self.area.extend_from_slice(&(content.len() as u16).to_le_bytes());
            self.area.extend_from_slice(&content);
        } else {
            let total = content.len() as u64;
            let data_ids: Vec<BlockId> = content
                .chunks(BLOCK_SIZE)
                .map(|chunk| txn.blocks().allocate(chunk.to_vec()))
                .collect();

            let (depth, ref_ids) = if data_ids.len() <= MAX_DIRECT_BLOCKS {
                (0u8, data_ids)
            } else {
                let index_ids: Vec<BlockId> = data_ids
                    .chunks(IDS_PER_INDEX_BLOCK)
                    .map(|ids| {
                        let mut payload = Vec::with_capacity(ids.len() * 8);
                        for id in ids {
                            payload.extend_from_slice(&id.0.to_le_bytes());
                        }
                        txn.blocks().allocate(payload)
                    })
                    .collect();
                (1u8, index_ids)
            };

            debug_assert!(ref_ids.len() <= MAX_DIRECT_BLOCKS, "blob exceeds one indirection level");

            self.area.push(EXTERNAL_TAG);
            self.area.extend_from_slice(&total.to_le_bytes());
            self.area.push(depth);
            self.area.extend_from_slice(&(ref_ids.len() as u16).to_le_bytes());
            for id in &ref_ids {
                self.area.extend_from_slice(&id.0.to_le_bytes());
            }
        }

        self.area.resize(MAX_REF_LEN, 0);
        Ok(())
    }
}

// ============================================================================
// Value sizer
// ============================================================================

/// Sizing contract the leaf layer requires for document values.
pub struct LeafValueSizer;

impl LeafValueSizer {
    /// On-leaf size of a value: its reference-area length.
    pub fn size(value: &LeafValue) -> Result<usize, StoreError> {
        value.inline_size()
    }

    /// Whether the value's reference area fits in `available` bytes.
    pub fn fits(value: &LeafValue, available: usize) -> bool {
        ref_fits(value.ref_area(), available)
    }

    pub fn max_possible_size() -> usize {
        MAX_REF_LEN
    }

    pub fn leaf_magic() -> [u8; 4] {
        crate::LEAF_MAGIC
    }
}
