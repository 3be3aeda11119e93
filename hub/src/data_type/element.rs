use super::DataType;

/// A trait representing a tensor element type.
///
/// Implemented for the plain-old-data numeric types.
/// `bool` tensors are read and written as `u8`.
pub trait Element:
    bytemuck::Pod + num::NumCast + num::ToPrimitive + std::fmt::Debug + Send + Sync + 'static
{
    /// The data type of the element.
    const DATA_TYPE: DataType;
}

macro_rules! impl_element_pod {
    ($t:ty, $data_type:ident) => {
        impl Element for $t {
            const DATA_TYPE: DataType = DataType::$data_type;
        }
    };
}

impl_element_pod!(i8, Int8);
impl_element_pod!(i16, Int16);
impl_element_pod!(i32, Int32);
impl_element_pod!(i64, Int64);
impl_element_pod!(u8, UInt8);
impl_element_pod!(u16, UInt16);
impl_element_pod!(u32, UInt32);
impl_element_pod!(u64, UInt64);
impl_element_pod!(half::f16, Float16);
impl_element_pod!(f32, Float32);
impl_element_pod!(f64, Float64);
