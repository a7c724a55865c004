use crate::expand::BLANK;
use ndarray::Array2;

/// Arg-max class per frame (first column wins on ties).
pub fn greedy_path(net_out: &Array2<f32>) -> Vec<usize> {
    net_out
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (k, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = k;
                }
            }
            best
        })
        .collect()
}

/// CTC collapse of a frame-level path: consecutive repeats merge, blanks
/// drop. `[a, a, blank, b, b, blank, blank, a]` becomes `[a, b, a]`.
pub fn collapse_path<I: IntoIterator<Item = usize>>(path: I) -> Vec<usize> {
    let mut hyp = Vec::new();
    let mut prev = BLANK;
    for class in path {
        if class != BLANK && class != prev {
            hyp.push(class);
        }
        prev = class;
    }
    hyp
}
