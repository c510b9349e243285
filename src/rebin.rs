use crate::axis::Axis;
use crate::error::{Result, WindowError};
use crate::volume::{Volume, cell_count, flat_index};

/// 权重低于该值的目标 bin 视为没有收到任何有效数据
const WEIGHT_FLOOR: f64 = 1e-12;

/// 目标 bin -> [(源 bin, 重叠权重)]
type AxisWeights = Vec<Vec<(usize, f64)>>;

/// 把体数据重采样到 counts 指定的分箱，物理范围不变
///
/// ## 聚合规则
/// - 每个轴独立计算源 bin 与目标 bin 的重叠长度作为权重，三个轴的权重相乘
/// - 信号取有效源 cell 的加权平均: Σ w·s / Σ w
/// - 误差平方按加权平均的误差传播: Σ w²·σ² / (Σ w)²
/// - 屏蔽的源 cell 权重为 0，没有收到任何有效权重的目标 bin 被屏蔽
pub fn rebin(volume: &Volume, counts: [usize; 3]) -> Result<Volume> {
    for axis in Axis::ALL {
        let count = counts[axis.index()];
        if count == 0 {
            return Err(WindowError::InvalidBinCount { axis, count });
        }
    }

    let total_elements = cell_count(counts)?;
    let shape = volume.shape();
    if counts == shape {
        return Ok(volume.clone());
    }

    // 三份累加量：Σ w·s, Σ w, Σ w²·σ²
    let mut weighted = Vec::with_capacity(volume.len());
    let mut weights = Vec::with_capacity(volume.len());
    let mut variance = Vec::with_capacity(volume.len());
    for ((&signal, &error_sq), &valid) in volume
        .signal()
        .iter()
        .zip(volume.error_sq())
        .zip(volume.valid())
    {
        if valid {
            weighted.push(signal);
            weights.push(1.0);
            variance.push(error_sq);
        } else {
            weighted.push(0.0);
            weights.push(0.0);
            variance.push(0.0);
        }
    }

    let mut current = shape;
    for axis in Axis::ALL {
        let a = axis.index();
        if counts[a] == current[a] {
            continue;
        }
        let table = overlap_weights(current[a], counts[a]);
        let (next, reshaped) = contract(&weighted, current, a, &table, false);
        weighted = next;
        weights = contract(&weights, current, a, &table, false).0;
        variance = contract(&variance, current, a, &table, true).0;
        current = reshaped;
    }

    let mut signal = Vec::with_capacity(total_elements);
    let mut error_sq = Vec::with_capacity(total_elements);
    let mut valid = Vec::with_capacity(total_elements);
    for index in 0..total_elements {
        let w = weights[index];
        if w > WEIGHT_FLOOR {
            signal.push(weighted[index] / w);
            error_sq.push(variance[index] / (w * w));
            valid.push(true);
        } else {
            signal.push(f64::NAN);
            error_sq.push(f64::NAN);
            valid.push(false);
        }
    }

    Ok(Volume::from_parts(counts, signal, error_sq, valid))
}

/// 单轴的重叠权重表
/// 源 bin i 占据索引区间 [i - 0.5, i + 0.5]
/// 目标 bin j 的中心在 j·s（s = (old - 1) / (new - 1)），宽度为 s，首尾截断到源数据的范围
fn overlap_weights(old: usize, new: usize) -> AxisWeights {
    if old == 1 {
        return vec![vec![(0, 1.0)]; new];
    }
    if new == 1 {
        return vec![(0..old).map(|i| (i, 1.0)).collect()];
    }

    let extent_lo = -0.5;
    let extent_hi = old as f64 - 0.5;
    let stride = (old - 1) as f64 / (new - 1) as f64;

    (0..new)
        .map(|j| {
            let center = j as f64 * stride;
            let lo = (center - stride / 2.0).max(extent_lo);
            let hi = (center + stride / 2.0).min(extent_hi);
            let first = (lo + 0.5).floor().max(0.0) as usize;
            let last = ((hi + 0.5).ceil() as usize).min(old);
            (first..last)
                .filter_map(|i| {
                    let cell_lo = i as f64 - 0.5;
                    let cell_hi = i as f64 + 0.5;
                    let overlap = hi.min(cell_hi) - lo.max(cell_lo);
                    (overlap > WEIGHT_FLOOR).then_some((i, overlap))
                })
                .collect()
        })
        .collect()
}

/// 沿一个轴做加权求和，返回新数组和新 shape
/// squared 为 true 时使用权重的平方（方差传播）
fn contract(
    data: &[f64],
    shape: [usize; 3],
    axis: usize,
    table: &AxisWeights,
    squared: bool,
) -> (Vec<f64>, [usize; 3]) {
    let mut reshaped = shape;
    reshaped[axis] = table.len();
    let mut out = vec![0.0; reshaped[0] * reshaped[1] * reshaped[2]];

    for i2 in 0..reshaped[2] {
        for i1 in 0..reshaped[1] {
            for i0 in 0..reshaped[0] {
                let dst = [i0, i1, i2];
                let mut acc = 0.0;
                for &(src, w) in &table[dst[axis]] {
                    let mut at = dst;
                    at[axis] = src;
                    let factor = if squared { w * w } else { w };
                    acc += factor * data[flat_index(shape, at)];
                }
                out[flat_index(reshaped, dst)] = acc;
            }
        }
    }

    (out, reshaped)
}
