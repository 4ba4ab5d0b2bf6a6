//! Kernel service tables.
//!
//! The subsystems in this tree do not own the scheduler, the timer, or the
//! memory manager; those collaborators live elsewhere in the kernel and
//! register function tables here during boot. Everything below the tables is
//! callable from any crate without a dependency edge onto the implementor.

mod service_cell;

pub mod memory;
pub mod platform;

pub use service_cell::ServiceCell;

/// Define a service table: the struct of function pointers, its global cell,
/// registration entry points, and a safe top-level wrapper per function.
///
/// ```ignore
/// crate::define_service! {
///     platform => PlatformServices {
///         timer_ticks() -> u64;
///         timer_sleep_ms(ms: u32);
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_service {
    ($name:ident => $table:ident {
        $( $fn_name:ident ( $( $arg:ident : $arg_ty:ty ),* ) $( -> $ret:ty )? ; )*
    }) => {
        $crate::paste::paste! {
            #[derive(Clone, Copy)]
            pub struct $table {
                $( pub $fn_name: fn( $( $arg_ty ),* ) $( -> $ret )?, )*
            }

            static [<$name:upper _SERVICES>]:
                $crate::kernel_services::ServiceCell<$table> =
                $crate::kernel_services::ServiceCell::new(stringify!($name));

            /// Install the implementation table. Later registrations replace
            /// earlier ones (tests swap in deterministic fakes this way).
            pub fn [<register_ $name _services>](table: &'static $table) {
                [<$name:upper _SERVICES>].register(table);
            }

            pub fn [<$name _services>]() -> &'static $table {
                [<$name:upper _SERVICES>].get()
            }

            pub fn [<$name _services_registered>]() -> bool {
                [<$name:upper _SERVICES>].is_registered()
            }

            $(
                #[inline(always)]
                pub fn $fn_name( $( $arg : $arg_ty ),* ) $( -> $ret )? {
                    ([<$name _services>]().$fn_name)( $( $arg ),* )
                }
            )*
        }
    };
}
