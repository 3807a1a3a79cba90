use crate::{state::*, StatusCode};
use ethereum_types::U256;
use sha3::{Digest, Keccak256};
use std::{cmp::min, num::NonZeroUsize};

pub(crate) const MAX_BUFFER_SIZE: u32 = u32::MAX;

/// The size of the EVM 256-bit word.
const WORD_SIZE: i64 = 32;

/// Returns number of words what would fit to provided number of bytes,
/// i.e. it rounds up the number bytes to number of words.
pub(crate) fn num_words(size_in_bytes: usize) -> i64 {
    ((size_in_bytes as i64) + (WORD_SIZE - 1)) / WORD_SIZE
}

#[derive(Clone, Copy)]
pub(crate) struct MemoryRegion {
    pub offset: usize,
    pub size: NonZeroUsize,
}

/// Charge the quadratic expansion cost for touching `[offset, offset+size)`
/// and grow memory to a word multiple covering it.
pub(crate) fn verify_memory_region_nonzero(
    state: &mut ExecutionState,
    offset: U256,
    size: NonZeroUsize,
) -> Result<MemoryRegion, StatusCode> {
    if offset > U256::from(MAX_BUFFER_SIZE) {
        return Err(StatusCode::OutOfGas);
    }

    let new_size = offset.as_usize() + size.get();
    let current_size = state.memory.len();
    if new_size > current_size {
        let new_words = num_words(new_size);
        let current_words = (current_size / 32) as i64;
        let new_cost = 3 * new_words + new_words * new_words / 512;
        let current_cost = 3 * current_words + current_words * current_words / 512;
        let cost = new_cost - current_cost;

        state.gas_left -= cost;

        if state.gas_left < 0 {
            return Err(StatusCode::OutOfGas);
        }

        state
            .memory
            .resize((new_words * WORD_SIZE) as usize, Default::default());
    }

    Ok(MemoryRegion {
        offset: offset.as_usize(),
        size,
    })
}

/// Like `verify_memory_region_nonzero`, but a zero-length access never
/// expands memory and costs nothing, whatever the offset.
pub(crate) fn verify_memory_region(
    state: &mut ExecutionState,
    offset: U256,
    size: U256,
) -> Result<Option<MemoryRegion>, StatusCode> {
    if size.is_zero() {
        return Ok(None);
    }

    if size > U256::from(MAX_BUFFER_SIZE) {
        return Err(StatusCode::OutOfGas);
    }

    verify_memory_region_nonzero(
        state,
        offset,
        NonZeroUsize::new(size.as_usize()).expect("checked non-zero"),
    )
    .map(Some)
}

pub(crate) fn mload(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let index = state.stack.pop();

    let region =
        verify_memory_region_nonzero(state, index, NonZeroUsize::new(32).expect("non-zero"))?;

    let value =
        U256::from_big_endian(&state.memory[region.offset..region.offset + region.size.get()]);

    state.stack.push(value);

    Ok(())
}

pub(crate) fn mstore(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let index = state.stack.pop();
    let value = state.stack.pop();

    let region =
        verify_memory_region_nonzero(state, index, NonZeroUsize::new(32).expect("non-zero"))?;

    let mut b = [0; 32];
    value.to_big_endian(&mut b);
    state.memory[region.offset..region.offset + 32].copy_from_slice(&b);

    Ok(())
}

pub(crate) fn mstore8(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let index = state.stack.pop();
    let value = state.stack.pop();

    let region =
        verify_memory_region_nonzero(state, index, NonZeroUsize::new(1).expect("non-zero"))?;

    state.memory[region.offset] = (value.low_u32() & 0xff) as u8;

    Ok(())
}

pub(crate) fn msize(state: &mut ExecutionState) {
    state.stack.push(state.memory.len().into());
}

/// Copy `src[src_index..]` into the verified region, charging 3 gas per
/// word of the region and zero-filling the tail past the source.
pub(crate) fn copy_into_region(
    state: &mut ExecutionState,
    region: MemoryRegion,
    src: &[u8],
    src_index: U256,
) -> Result<(), StatusCode> {
    let copy_cost = num_words(region.size.get()) * 3;
    state.gas_left -= copy_cost;
    if state.gas_left < 0 {
        return Err(StatusCode::OutOfGas);
    }

    let start = min(U256::from(src.len()), src_index).as_usize();
    let copy_size = min(region.size.get(), src.len() - start);

    if copy_size > 0 {
        state.memory[region.offset..region.offset + copy_size]
            .copy_from_slice(&src[start..start + copy_size]);
    }

    if region.size.get() - copy_size > 0 {
        state.memory[region.offset + copy_size..region.offset + region.size.get()].fill(0);
    }

    Ok(())
}

pub(crate) fn calldatacopy(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let mem_index = state.stack.pop();
    let input_index = state.stack.pop();
    let size = state.stack.pop();

    if let Some(region) = verify_memory_region(state, mem_index, size)? {
        let input = state.message.input_data.clone();
        copy_into_region(state, region, &input, input_index)?;
    }

    Ok(())
}

pub(crate) fn codesize(stack: &mut Stack, code: &[u8]) {
    stack.push(code.len().into())
}

pub(crate) fn codecopy(state: &mut ExecutionState, code: &[u8]) -> Result<(), StatusCode> {
    let mem_index = state.stack.pop();
    let input_index = state.stack.pop();
    let size = state.stack.pop();

    if let Some(region) = verify_memory_region(state, mem_index, size)? {
        copy_into_region(state, region, code, input_index)?;
    }

    Ok(())
}

pub(crate) fn returndatasize(state: &mut ExecutionState) {
    state.stack.push(state.return_data.len().into());
}

pub(crate) fn returndatacopy(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let mem_index = state.stack.pop();
    let input_index = state.stack.pop();
    let size = state.stack.pop();

    let region = verify_memory_region(state, mem_index, size)?;

    // Unlike the other copies, reading past the return buffer faults.
    if input_index > U256::from(state.return_data.len()) {
        return Err(StatusCode::InvalidMemoryAccess);
    }
    let src = input_index.as_usize();

    if src + region.as_ref().map(|r| r.size.get()).unwrap_or(0) > state.return_data.len() {
        return Err(StatusCode::InvalidMemoryAccess);
    }

    if let Some(region) = region {
        let copy_cost = num_words(region.size.get()) * 3;
        state.gas_left -= copy_cost;
        if state.gas_left < 0 {
            return Err(StatusCode::OutOfGas);
        }

        state.memory[region.offset..region.offset + region.size.get()]
            .copy_from_slice(&state.return_data[src..src + region.size.get()]);
    }

    Ok(())
}

pub(crate) fn keccak256(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let index = state.stack.pop();
    let size = state.stack.pop();

    let region = verify_memory_region(state, index, size)?;

    state.stack.push(U256::from_big_endian(&*Keccak256::digest(
        if let Some(region) = region {
            let w = num_words(region.size.get());
            let cost = w * 6;
            state.gas_left -= cost;
            if state.gas_left < 0 {
                return Err(StatusCode::OutOfGas);
            }

            &state.memory[region.offset..region.offset + region.size.get()]
        } else {
            &[]
        },
    )));

    Ok(())
}
