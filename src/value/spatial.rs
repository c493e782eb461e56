// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Spatial value types.
//!
//! The server identifies coordinate reference systems by SRID; the four
//! combinations the DBMS knows are mapped to dedicated types.

#![allow(non_camel_case_types)]

pub(crate) const SRID_CARTESIAN_2D: i64 = 7203;
pub(crate) const SRID_CARTESIAN_3D: i64 = 9157;
pub(crate) const SRID_WGS84_2D: i64 = 4326;
pub(crate) const SRID_WGS84_3D: i64 = 4979;

macro_rules! impl_point {
    ($name:ident, $srid:expr, $dims:literal; $($accessor:ident => $idx:expr),+) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            pub(crate) srid: i64,
            pub(crate) coordinates: [f64; $dims],
        }

        impl $name {
            pub fn new($($accessor: f64),+) -> Self {
                Self {
                    srid: $srid,
                    coordinates: [$($accessor),+],
                }
            }

            pub fn srid(&self) -> i64 {
                self.srid
            }

            pub fn coordinates(&self) -> &[f64; $dims] {
                &self.coordinates
            }

            $(
                pub fn $accessor(&self) -> f64 {
                    self.coordinates[$idx]
                }
            )+

            pub(crate) fn eq_data(&self, other: &Self) -> bool {
                self.srid == other.srid
                    && self
                        .coordinates
                        .iter()
                        .zip(other.coordinates.iter())
                        .all(|(l, r)| l.to_bits() == r.to_bits())
            }
        }
    };
}

impl_point!(Cartesian2D, SRID_CARTESIAN_2D, 2; x => 0, y => 1);
impl_point!(Cartesian3D, SRID_CARTESIAN_3D, 3; x => 0, y => 1, z => 2);
impl_point!(WGS84_2D, SRID_WGS84_2D, 2; longitude => 0, latitude => 1);
impl_point!(WGS84_3D, SRID_WGS84_3D, 3; longitude => 0, latitude => 1, altitude => 2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srids() {
        assert_eq!(Cartesian2D::new(1.0, 2.0).srid(), 7203);
        assert_eq!(Cartesian3D::new(1.0, 2.0, 3.0).srid(), 9157);
        assert_eq!(WGS84_2D::new(1.0, 2.0).srid(), 4326);
        assert_eq!(WGS84_3D::new(1.0, 2.0, 3.0).srid(), 4979);
    }

    #[test]
    fn test_accessors() {
        let p = Cartesian3D::new(1.0, 2.0, 3.0);
        assert_eq!(p.x(), 1.0);
        assert_eq!(p.y(), 2.0);
        assert_eq!(p.z(), 3.0);
    }

    #[test]
    fn test_eq_data_compares_bits() {
        let p1 = Cartesian2D::new(f64::NAN, 0.0);
        let p2 = Cartesian2D::new(f64::NAN, 0.0);
        assert!(p1.eq_data(&p2));
        let p3 = Cartesian2D::new(0.0, -0.0);
        let p4 = Cartesian2D::new(0.0, 0.0);
        assert!(!p3.eq_data(&p4));
    }
}
