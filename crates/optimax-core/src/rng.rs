/// Deterministic PRNG used for every random decision in a game, so a seed plus the
/// submitted actions replay exactly.
///
/// This is `xoshiro256**` seeded via SplitMix64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameRng {
    state: [u64; 4],
}

impl GameRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        let mut sm = SplitMix64 { state: seed };
        Self {
            state: [sm.next(), sm.next(), sm.next(), sm.next()],
        }
    }

    /// Independent stream derived from a base seed, e.g. one per (depth, attempt) of map
    /// generation. Streams never depend on how much of another stream was consumed.
    pub fn stream(seed: u64, a: u64, b: u64) -> Self {
        let mut sm = SplitMix64 {
            state: seed ^ a.wrapping_mul(0xd1b5_4a32_d192_ed03) ^ b.rotate_left(32),
        };
        Self::seed_from_u64(sm.next())
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);

        let t = self.state[1] << 17;

        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];

        self.state[2] ^= t;

        self.state[3] = self.state[3].rotate_left(45);

        result
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform index in `0..len`. Returns 0 for an empty range.
    pub fn gen_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let span = len as u64;
        let threshold = u64::MAX - (u64::MAX % span);
        loop {
            let x = self.next_u64();
            if x < threshold {
                return (x % span) as usize;
            }
        }
    }

    /// Uniform value in `[start, end)`; `start` when the range is empty.
    pub fn gen_range_i32(&mut self, range: std::ops::Range<i32>) -> i32 {
        if range.start >= range.end {
            return range.start;
        }
        let span = (range.end as i64 - range.start as i64) as usize;
        range.start + self.gen_index(span) as i32
    }

    /// Random f32 in [0.0, 1.0).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// `true` with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    pub fn gen_bool(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.gen_index(items.len()))
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.gen_index(i + 1);
            items.swap(i, j);
        }
    }
}

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}
