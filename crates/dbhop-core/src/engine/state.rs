use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt::Write;

/// Charge configuration of the surface.
///
/// `order` is a permutation of the site indices split at `nel`: the prefix
/// holds the occupied sites and the suffix the unoccupied ones, each in no
/// particular order. `position` is the inverse permutation so that a site's
/// slot is found in constant time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeState {
    order: Vec<usize>,
    position: Vec<usize>,
    charge: Vec<u8>,
    nel: usize,
}

impl ChargeState {
    /// An empty configuration of `n` sites.
    pub fn empty(n: usize) -> Self {
        Self {
            order: (0..n).collect(),
            position: (0..n).collect(),
            charge: vec![0; n],
            nel: 0,
        }
    }

    /// A uniformly random placement of `nel` electrons on `n` sites.
    pub fn random(n: usize, nel: usize, rng: &mut impl Rng) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        Self::from_order(order, nel)
    }

    /// The configuration with exactly the sites flagged non-zero occupied.
    pub fn from_charges(charges: &[u8]) -> Self {
        let (occ, nocc): (Vec<usize>, Vec<usize>) = (0..charges.len()).partition(|&i| charges[i] != 0);
        let nel = occ.len();
        let order = occ.into_iter().chain(nocc).collect();
        Self::from_order(order, nel)
    }

    fn from_order(order: Vec<usize>, nel: usize) -> Self {
        let n = order.len();
        let mut position = vec![0; n];
        let mut charge = vec![0; n];
        for (slot, &site) in order.iter().enumerate() {
            position[site] = slot;
            if slot < nel {
                charge[site] = 1;
            }
        }
        Self {
            order,
            position,
            charge,
            nel,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn nel(&self) -> usize {
        self.nel
    }

    pub fn charge(&self) -> &[u8] {
        &self.charge
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn occupied(&self) -> &[usize] {
        &self.order[..self.nel]
    }

    pub fn unoccupied(&self) -> &[usize] {
        &self.order[self.nel..]
    }

    #[inline]
    pub fn is_occupied(&self, site: usize) -> bool {
        self.charge[site] != 0
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
        self.position[self.order[a]] = a;
        self.position[self.order[b]] = b;
    }

    /// Moves the electron at `src` onto the unoccupied site `trg`.
    pub(crate) fn surface_hop(&mut self, src: usize, trg: usize) {
        debug_assert!(self.is_occupied(src) && !self.is_occupied(trg));
        let (s, t) = (self.position[src], self.position[trg]);
        self.swap_slots(s, t);
        self.charge[src] = 0;
        self.charge[trg] = 1;
    }

    /// Removes the electron at `src` from the surface.
    pub(crate) fn remove(&mut self, src: usize) {
        debug_assert!(self.is_occupied(src));
        let last = self.nel - 1;
        self.swap_slots(self.position[src], last);
        self.charge[src] = 0;
        self.nel -= 1;
    }

    /// Places an electron on the `index`-th unoccupied site and returns that site.
    pub(crate) fn inject(&mut self, index: usize) -> usize {
        let slot = self.nel + index;
        let site = self.order[slot];
        self.swap_slots(slot, self.nel);
        self.charge[site] = 1;
        self.nel += 1;
        site
    }

    /// Moves the partition to `nel`, keeping the current slot order.
    /// Returns the sites whose occupation changed.
    pub(crate) fn set_nel(&mut self, nel: usize) -> Vec<usize> {
        let (lo, hi) = if nel < self.nel {
            (nel, self.nel)
        } else {
            (self.nel, nel)
        };
        let changed = self.order[lo..hi].to_vec();
        for &site in &changed {
            self.charge[site] ^= 1;
        }
        self.nel = nel;
        changed
    }

    /// Hex encoding of the charge bits with site 0 as the most significant bit.
    pub fn signature(&self) -> String {
        let n = self.charge.len();
        if n == 0 {
            return "0x0".to_string();
        }
        let digits = 1 + (n - 1) / 4;
        let pad = 4 * digits - n;
        let bits: Vec<u8> = std::iter::repeat_n(0, pad)
            .chain(self.charge.iter().copied())
            .collect();
        let mut out = String::with_capacity(digits + 2);
        out.push_str("0x");
        for nibble in bits.chunks(4) {
            let value = nibble.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32);
            let _ = write!(out, "{value:x}");
        }
        out
    }

    /// True if `order` is a permutation consistent with `position`, `charge` and `nel`.
    pub fn is_consistent(&self) -> bool {
        let n = self.order.len();
        let mut seen = vec![false; n];
        for (slot, &site) in self.order.iter().enumerate() {
            if site >= n || seen[site] || self.position[site] != slot {
                return false;
            }
            seen[site] = true;
            if (self.charge[site] == 1) != (slot < self.nel) {
                return false;
            }
        }
        self.nel <= n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn random_state_places_requested_electrons() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let state = ChargeState::random(10, 4, &mut rng);
        assert!(state.is_consistent());
        assert_eq!(state.charge().iter().filter(|&&c| c == 1).count(), 4);
        assert_eq!(state.occupied().len(), 4);
        assert_eq!(state.unoccupied().len(), 6);
    }

    #[test]
    fn from_charges_occupies_flagged_sites() {
        let state = ChargeState::from_charges(&[1, 0, 0, 1]);
        assert!(state.is_consistent());
        assert_eq!(state.occupied(), &[0, 3]);
        assert_eq!(state.unoccupied(), &[1, 2]);
    }

    #[test]
    fn surface_hop_swaps_occupation() {
        let mut state = ChargeState::from_charges(&[1, 0, 0]);
        state.surface_hop(0, 2);
        assert!(state.is_consistent());
        assert_eq!(state.charge(), &[0, 0, 1]);
        assert_eq!(state.nel(), 1);
    }

    #[test]
    fn remove_and_inject_move_the_partition() {
        let mut state = ChargeState::from_charges(&[1, 1, 0, 0]);
        state.remove(0);
        assert!(state.is_consistent());
        assert_eq!(state.nel(), 1);
        assert!(!state.is_occupied(0));

        let index = state.unoccupied().iter().position(|&s| s == 3).unwrap();
        let site = state.inject(index);
        assert_eq!(site, 3);
        assert!(state.is_consistent());
        assert_eq!(state.nel(), 2);
        assert_eq!(state.charge(), &[0, 1, 0, 1]);
    }

    #[test]
    fn set_nel_reports_changed_sites() {
        let mut state = ChargeState::from_charges(&[1, 0, 0, 0]);
        let changed = state.set_nel(3);
        assert_eq!(changed.len(), 2);
        assert!(state.is_consistent());
        let changed = state.set_nel(0);
        assert_eq!(changed.len(), 3);
        assert!(state.charge().iter().all(|&c| c == 0));
    }

    #[test]
    fn signature_matches_binary_hex_encoding() {
        assert_eq!(ChargeState::from_charges(&[1, 0, 1]).signature(), "0x5");
        assert_eq!(ChargeState::from_charges(&[1, 0, 0, 0, 0]).signature(), "0x10");
        assert_eq!(
            ChargeState::from_charges(&[1, 1, 1, 1, 0, 0, 0, 1]).signature(),
            "0xf1"
        );
    }
}
