// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use hwi::stack::{IsrStack, STACK_FILL};
use proptest::prelude::*;

proptest! {
    #[test]
    fn high_water_mark_is_size_minus_untouched(
        (size, k) in (1usize..1024).prop_flat_map(|n| (Just(n), 0..=n)),
        dirt in 0u8..=255,
    ) {
        prop_assume!(dirt != STACK_FILL);
        let mut buf = vec![0u8; size];
        let top = buf.as_ptr() as usize + size;
        IsrStack::new(&mut buf).init(top);
        prop_assert!(buf.iter().all(|&b| b == STACK_FILL));

        buf[k..].fill(dirt);
        let info = IsrStack::new(&mut buf).info(true);
        prop_assert_eq!(info.size, size);
        prop_assert_eq!(info.used, size - k);
        prop_assert_eq!(info.overflow, k == 0);
    }
}
