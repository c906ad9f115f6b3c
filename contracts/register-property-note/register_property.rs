// Do not link against libstd (i.e. anything defined in `std::`)
#![no_std]

use miden::*;

use crate::bindings::miden::real_estate_x::real_estate_x;

/// Registers property 1 to owner 7 on the consuming RealEstateX account.
#[note_script]
fn run(_arg: Word) {
    let count_before = real_estate_x::property_count();
    let count = real_estate_x::register_property(felt!(1), felt!(7));

    assert_eq(count, count_before + felt!(1));
    assert_eq(real_estate_x::owner_of(felt!(1)), felt!(7));
}
