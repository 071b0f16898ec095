//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! This crate carries no library code of its own -- it exists so the cross-component
//! scenarios in `tests/` run against `pgbackrest-core` as an ordinary downstream
//! dependent rather than from inside the core's own `#[cfg(test)]` modules, the way
//! `pgrx-tests` exercises `pgrx` from outside.
