use bytes::BytesMut;
use core::mem;

/// 可按字节重解释的元素类型。
///
/// # Safety
/// 实现者必须保证：
/// - 类型不含填充字节，`size_of::<T>()` 个字节全部属于值本身；
/// - 任意位模式都是合法值（收包路径会把对端字节直接写入元素区间）；
/// - 类型不持有引用或析构逻辑。
///
/// 因此 `bool`、`char`、枚举以及带填充的结构体都不能实现本 trait。
pub unsafe trait PlainData: Copy + Send + Sync + 'static {}

macro_rules! impl_plain_data {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: 基本数值类型无填充且任意位模式合法。
            unsafe impl PlainData for $ty {}
        )*
    };
}

impl_plain_data!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

// SAFETY: 数组按元素紧密排列，元素满足约束时数组同样满足。
unsafe impl<T: PlainData, const N: usize> PlainData for [T; N] {}

/// 元素的字节宽度。
pub fn element_width<C: Container + ?Sized>() -> usize {
    mem::size_of::<C::Element>()
}

/// 通道可收发的连续容器。
///
/// # 契约（What）
/// - `elements` / `elements_mut` 返回容器当前全部元素，顺序即线上字节顺序；
/// - 容器的字节长度恒为 `elements().len() * element_width::<Self>()`，适配器据此推导 `size`。
pub trait Container: Send {
    /// 元素类型。
    type Element: PlainData;

    /// 元素只读视图。
    fn elements(&self) -> &[Self::Element];

    /// 元素可写视图。
    fn elements_mut(&mut self) -> &mut [Self::Element];

    /// 全部元素的字节视图。
    fn as_bytes(&self) -> &[u8] {
        bytes_of(self.elements())
    }

    /// 全部元素的可写字节视图，长度固定为当前字节长度。
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytes_of_mut(self.elements_mut())
    }
}

/// 支持按元素个数调整大小的容器。
///
/// 这是收包侧“按对端长度自动扩容”的编译期能力标记：只有实现了本 trait 的容器才能构造
/// [`RefChannelBuffer`](crate::RefChannelBuffer)，其余容器只能参与定长交换。
pub trait ResizableContainer: Container {
    /// 调整为 `len` 个元素；新增元素为全零位模式。
    ///
    /// 无法分配时返回 `false` 且容器保持原样，不得 panic 或中止进程。
    fn resize_elements(&mut self, len: usize) -> bool;
}

fn zeroed<T: PlainData>() -> T {
    // SAFETY: `PlainData` 保证任意位模式（包括全零）都是合法值。
    unsafe { mem::zeroed() }
}

pub(crate) fn bytes_of<T: PlainData>(elements: &[T]) -> &[u8] {
    // SAFETY: `PlainData` 无填充，切片内存连续且已初始化；生命周期与输入借用一致。
    unsafe { core::slice::from_raw_parts(elements.as_ptr().cast::<u8>(), mem::size_of_val(elements)) }
}

pub(crate) fn bytes_of_mut<T: PlainData>(elements: &mut [T]) -> &mut [u8] {
    let len = mem::size_of_val(elements);
    // SAFETY: 同上；此外 `PlainData` 允许任意位模式，因此通过字节视图写入不会产生非法值。
    unsafe { core::slice::from_raw_parts_mut(elements.as_mut_ptr().cast::<u8>(), len) }
}

pub(crate) fn byte_len<C: Container + ?Sized>(container: &C) -> u64 {
    (container.elements().len() as u64) * element_width::<C>() as u64
}

/// 借用变体的扩容规则：宽度为零的元素只接受 0 字节，其余要求整数倍。
pub(crate) fn resize_bytes<C: ResizableContainer + ?Sized>(container: &mut C, bytes: u64) -> bool {
    let width = element_width::<C>() as u64;
    if width == 0 {
        return bytes == 0;
    }
    if bytes % width != 0 {
        return false;
    }
    let Ok(len) = usize::try_from(bytes / width) else {
        return false;
    };
    container.resize_elements(len)
}

impl<T: PlainData> Container for Vec<T> {
    type Element = T;

    fn elements(&self) -> &[T] {
        self.as_slice()
    }

    fn elements_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: PlainData> ResizableContainer for Vec<T> {
    fn resize_elements(&mut self, len: usize) -> bool {
        if self.try_reserve_exact(len.saturating_sub(self.len())).is_err() {
            return false;
        }
        self.resize_with(len, zeroed::<T>);
        true
    }
}

impl<T: PlainData> Container for Box<[T]> {
    type Element = T;

    fn elements(&self) -> &[T] {
        self
    }

    fn elements_mut(&mut self) -> &mut [T] {
        self
    }
}

impl<T: PlainData, const N: usize> Container for [T; N] {
    type Element = T;

    fn elements(&self) -> &[T] {
        self.as_slice()
    }

    fn elements_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl Container for BytesMut {
    type Element = u8;

    fn elements(&self) -> &[u8] {
        self.as_ref()
    }

    fn elements_mut(&mut self) -> &mut [u8] {
        self.as_mut()
    }
}

impl ResizableContainer for BytesMut {
    fn resize_elements(&mut self, len: usize) -> bool {
        // `BytesMut` 没有可失败的预留接口，超过 `isize::MAX` 的请求必然溢出容量。
        if len > isize::MAX as usize {
            return false;
        }
        self.resize(len, 0);
        true
    }
}
