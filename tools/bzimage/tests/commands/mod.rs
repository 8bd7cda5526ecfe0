// SPDX-License-Identifier: MPL-2.0

mod copy;
mod initramfs;
mod inspect;
