use bytemuck::pod_read_unaligned;

#[inline(always)]
pub fn hamming<const N: usize>(va: &[u8], vb: &[u8]) -> u32 {
    match N {
        256 => hamming_256(va, vb),
        _ => hamming_naive::<N>(va, vb),
    }
}

#[inline(always)]
pub fn hamming_naive<const N: usize>(va: &[u8], vb: &[u8]) -> u32 {
    let mut sum = 0;
    for i in 0..N / 8 {
        sum += (va[i] ^ vb[i]).count_ones();
    }
    sum
}

#[inline(always)]
pub fn hamming_256(va: &[u8], vb: &[u8]) -> u32 {
    // 描述符存放在 Vec<[u8; 32]> 中，不保证 8 字节对齐，不能直接 cast_slice
    let va: [u64; 4] = pod_read_unaligned(&va[..32]);
    let vb: [u64; 4] = pod_read_unaligned(&vb[..32]);
    (va[0] ^ vb[0]).count_ones()
        + (va[1] ^ vb[1]).count_ones()
        + (va[2] ^ vb[2]).count_ones()
        + (va[3] ^ vb[3]).count_ones()
}

/// 在 vb 中寻找与 va 汉明距离最小的向量，返回其索引和距离
///
/// 距离相同时返回最先出现的向量，vb 为空时返回 None
pub fn nearest_hamming(va: &[u8; 32], vb: &[[u8; 32]]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, chunk) in vb.iter().enumerate() {
        let d = hamming_256(va, chunk);
        match best {
            Some((_, bd)) if d >= bd => {}
            _ => {
                best = Some((i, d));
                if d == 0 {
                    break;
                }
            }
        }
    }
    best
}
