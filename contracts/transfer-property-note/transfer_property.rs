// Do not link against libstd (i.e. anything defined in `std::`)
#![no_std]

use miden::*;

use crate::bindings::miden::real_estate_x::real_estate_x;

/// Moves property 1 to owner 9 on the consuming RealEstateX account.
#[note_script]
fn run(_arg: Word) {
    let count_before = real_estate_x::property_count();
    real_estate_x::transfer_property(felt!(1), felt!(9));

    assert_eq(real_estate_x::property_count(), count_before);
    assert_eq(real_estate_x::owner_of(felt!(1)), felt!(9));
}
