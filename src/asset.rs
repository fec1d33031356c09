//! Binary asset container.
//!
//! Every asset starts with a magic number, a length-prefixed type name and a
//! version, followed by a type-specific payload. The texture payload carries
//! a sampler descriptor, a texture descriptor and either a raw byte blob or a
//! PNG blob (decoding PNG is the codec's business, not ours).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ordered_float::NotNan;
use std::io::{Cursor, Read};

use crate::error::{AssetError, Error, Result};
use crate::rhi;

pub const ASSET_MAGIC: u32 = 0x5373_d269;
pub const TEXTURE_ASSET_TYPE_NAME: &str = "texture";
pub const TEXTURE_ASSET_VERSION: u32 = 1;

#[derive(Clone, Debug)]
pub struct AssetHeader {
    pub type_name: String,
    pub version: u32,
}

#[derive(Clone, Debug)]
pub enum TextureAssetData {
    Raw(Vec<u8>),
    Png(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct TextureAsset {
    pub sampler: rhi::SamplerDesc,
    pub texture: rhi::TextureDesc,
    pub data: TextureAssetData,
}

//--------------------------------------------------------------------------------------------------
// Readers

fn read_string(reader: &mut Cursor<&[u8]>) -> Result<String> {
    let length = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| AssetError::Truncated)? as usize;
    let mut bytes = vec![0u8; length];
    reader
        .read_exact(&mut bytes)
        .map_err(|_| AssetError::Truncated)?;
    String::from_utf8(bytes).map_err(|_| AssetError::Truncated.into())
}

fn read_u32(reader: &mut Cursor<&[u8]>) -> Result<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|_| AssetError::Truncated.into())
}

fn read_f32(reader: &mut Cursor<&[u8]>) -> Result<f32> {
    reader
        .read_f32::<LittleEndian>()
        .map_err(|_| AssetError::Truncated.into())
}

pub fn read_asset_header(reader: &mut Cursor<&[u8]>) -> Result<AssetHeader> {
    let magic = read_u32(reader)?;
    if magic != ASSET_MAGIC {
        return Err(AssetError::BadMagic { found: magic }.into());
    }
    let type_name = read_string(reader)?;
    let version = read_u32(reader)?;
    Ok(AssetHeader { type_name, version })
}

/// Parses a texture asset. Failures are logged on the `asset` target; the
/// caller may treat the asset as missing.
pub fn load_texture_asset(data: &[u8]) -> Result<TextureAsset> {
    load_texture_asset_inner(data).map_err(|error| {
        log::error!(target: "asset", "failed to load texture asset: {}", error);
        error
    })
}

fn load_texture_asset_inner(data: &[u8]) -> Result<TextureAsset> {
    let mut reader = Cursor::new(data);
    let header = read_asset_header(&mut reader)?;
    if header.type_name != TEXTURE_ASSET_TYPE_NAME {
        return Err(AssetError::WrongTypeName {
            expected: TEXTURE_ASSET_TYPE_NAME.to_string(),
            found: header.type_name,
        }
        .into());
    }
    if header.version != TEXTURE_ASSET_VERSION {
        return Err(AssetError::UnsupportedVersion {
            found: header.version,
        }
        .into());
    }

    let sampler = read_sampler_desc(&mut reader)?;
    let texture = read_texture_desc(&mut reader)?;

    let kind = read_u32(&mut reader)?;
    let length = read_u32(&mut reader)? as usize;
    let mut blob = vec![0u8; length];
    reader
        .read_exact(&mut blob)
        .map_err(|_| Error::from(AssetError::Truncated))?;
    let data = match kind {
        0 => TextureAssetData::Raw(blob),
        1 => TextureAssetData::Png(blob),
        _ => return Err(AssetError::Truncated.into()),
    };

    Ok(TextureAsset {
        sampler,
        texture,
        data,
    })
}

pub fn save_texture_asset(asset: &TextureAsset) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(ASSET_MAGIC).unwrap();
    out.write_u32::<LittleEndian>(TEXTURE_ASSET_TYPE_NAME.len() as u32)
        .unwrap();
    out.extend_from_slice(TEXTURE_ASSET_TYPE_NAME.as_bytes());
    out.write_u32::<LittleEndian>(TEXTURE_ASSET_VERSION).unwrap();

    write_sampler_desc(&mut out, &asset.sampler);
    write_texture_desc(&mut out, &asset.texture);

    let (kind, blob) = match &asset.data {
        TextureAssetData::Raw(blob) => (0u32, blob),
        TextureAssetData::Png(blob) => (1u32, blob),
    };
    out.write_u32::<LittleEndian>(kind).unwrap();
    out.write_u32::<LittleEndian>(blob.len() as u32).unwrap();
    out.extend_from_slice(blob);
    out
}

//--------------------------------------------------------------------------------------------------
// Descriptor encodings

fn filter_to_u32(filter: rhi::SamplerFilterMode) -> u32 {
    match filter {
        rhi::SamplerFilterMode::Nearest => 0,
        rhi::SamplerFilterMode::Linear => 1,
    }
}

fn filter_from_u32(value: u32) -> Result<rhi::SamplerFilterMode> {
    match value {
        0 => Ok(rhi::SamplerFilterMode::Nearest),
        1 => Ok(rhi::SamplerFilterMode::Linear),
        _ => Err(AssetError::Truncated.into()),
    }
}

fn mipmap_mode_to_u32(mode: rhi::SamplerMipmapMode) -> u32 {
    match mode {
        rhi::SamplerMipmapMode::Nearest => 0,
        rhi::SamplerMipmapMode::Linear => 1,
    }
}

fn mipmap_mode_from_u32(value: u32) -> Result<rhi::SamplerMipmapMode> {
    match value {
        0 => Ok(rhi::SamplerMipmapMode::Nearest),
        1 => Ok(rhi::SamplerMipmapMode::Linear),
        _ => Err(AssetError::Truncated.into()),
    }
}

fn address_mode_to_u32(mode: rhi::SamplerAddressMode) -> u32 {
    match mode {
        rhi::SamplerAddressMode::Wrap => 0,
        rhi::SamplerAddressMode::Clamp => 1,
        rhi::SamplerAddressMode::Mirror => 2,
        rhi::SamplerAddressMode::Border => 3,
    }
}

fn address_mode_from_u32(value: u32) -> Result<rhi::SamplerAddressMode> {
    match value {
        0 => Ok(rhi::SamplerAddressMode::Wrap),
        1 => Ok(rhi::SamplerAddressMode::Clamp),
        2 => Ok(rhi::SamplerAddressMode::Mirror),
        3 => Ok(rhi::SamplerAddressMode::Border),
        _ => Err(AssetError::Truncated.into()),
    }
}

fn compare_op_to_u32(op: Option<rhi::CompareOp>) -> u32 {
    match op {
        None => 0,
        Some(rhi::CompareOp::Never) => 1,
        Some(rhi::CompareOp::Less) => 2,
        Some(rhi::CompareOp::Equal) => 3,
        Some(rhi::CompareOp::LessEqual) => 4,
        Some(rhi::CompareOp::Greater) => 5,
        Some(rhi::CompareOp::NotEqual) => 6,
        Some(rhi::CompareOp::GreaterEqual) => 7,
        Some(rhi::CompareOp::Always) => 8,
    }
}

fn compare_op_from_u32(value: u32) -> Result<Option<rhi::CompareOp>> {
    match value {
        0 => Ok(None),
        1 => Ok(Some(rhi::CompareOp::Never)),
        2 => Ok(Some(rhi::CompareOp::Less)),
        3 => Ok(Some(rhi::CompareOp::Equal)),
        4 => Ok(Some(rhi::CompareOp::LessEqual)),
        5 => Ok(Some(rhi::CompareOp::Greater)),
        6 => Ok(Some(rhi::CompareOp::NotEqual)),
        7 => Ok(Some(rhi::CompareOp::GreaterEqual)),
        8 => Ok(Some(rhi::CompareOp::Always)),
        _ => Err(AssetError::Truncated.into()),
    }
}

fn format_to_u32(format: rhi::ResourceFormat) -> u32 {
    use crate::rhi::ResourceFormat::*;
    match format {
        Undefined => 0,
        R8Unorm => 1,
        Rg8Unorm => 2,
        Rgba8Unorm => 3,
        Rgba8Srgb => 4,
        Bgra8Unorm => 5,
        Bgra8Srgb => 6,
        R16Float => 7,
        Rg16Float => 8,
        Rgba16Float => 9,
        R32Uint => 10,
        R32Float => 11,
        Rg32Float => 12,
        Rgba32Float => 13,
        Rg11B10Float => 14,
        Rgb10A2Unorm => 15,
        D16Unorm => 16,
        D24UnormS8Uint => 17,
        D32Float => 18,
        D32FloatS8Uint => 19,
        Bc1RgbaUnorm => 20,
        Bc1RgbaSrgb => 21,
        Bc3RgbaUnorm => 22,
        Bc3RgbaSrgb => 23,
        Bc5RgUnorm => 24,
        Bc7RgbaUnorm => 25,
        Bc7RgbaSrgb => 26,
    }
}

fn format_from_u32(value: u32) -> Result<rhi::ResourceFormat> {
    use crate::rhi::ResourceFormat::*;
    Ok(match value {
        0 => Undefined,
        1 => R8Unorm,
        2 => Rg8Unorm,
        3 => Rgba8Unorm,
        4 => Rgba8Srgb,
        5 => Bgra8Unorm,
        6 => Bgra8Srgb,
        7 => R16Float,
        8 => Rg16Float,
        9 => Rgba16Float,
        10 => R32Uint,
        11 => R32Float,
        12 => Rg32Float,
        13 => Rgba32Float,
        14 => Rg11B10Float,
        15 => Rgb10A2Unorm,
        16 => D16Unorm,
        17 => D24UnormS8Uint,
        18 => D32Float,
        19 => D32FloatS8Uint,
        20 => Bc1RgbaUnorm,
        21 => Bc1RgbaSrgb,
        22 => Bc3RgbaUnorm,
        23 => Bc3RgbaSrgb,
        24 => Bc5RgUnorm,
        25 => Bc7RgbaUnorm,
        26 => Bc7RgbaSrgb,
        _ => return Err(AssetError::Truncated.into()),
    })
}

fn dim_to_u32(dim: rhi::TextureDimension) -> u32 {
    match dim {
        rhi::TextureDimension::D1 => 1,
        rhi::TextureDimension::D2 => 2,
        rhi::TextureDimension::D3 => 3,
    }
}

fn dim_from_u32(value: u32) -> Result<rhi::TextureDimension> {
    match value {
        1 => Ok(rhi::TextureDimension::D1),
        2 => Ok(rhi::TextureDimension::D2),
        3 => Ok(rhi::TextureDimension::D3),
        _ => Err(AssetError::Truncated.into()),
    }
}

fn write_sampler_desc(out: &mut Vec<u8>, desc: &rhi::SamplerDesc) {
    out.write_u32::<LittleEndian>(filter_to_u32(desc.mag_filter)).unwrap();
    out.write_u32::<LittleEndian>(filter_to_u32(desc.min_filter)).unwrap();
    out.write_u32::<LittleEndian>(mipmap_mode_to_u32(desc.mipmap_mode)).unwrap();
    out.write_u32::<LittleEndian>(address_mode_to_u32(desc.address_mode_u)).unwrap();
    out.write_u32::<LittleEndian>(address_mode_to_u32(desc.address_mode_v)).unwrap();
    out.write_u32::<LittleEndian>(address_mode_to_u32(desc.address_mode_w)).unwrap();
    out.write_f32::<LittleEndian>(desc.lod_bias.into_inner()).unwrap();
    out.write_f32::<LittleEndian>(desc.lod_min.into_inner()).unwrap();
    out.write_f32::<LittleEndian>(desc.lod_max.into_inner()).unwrap();
    out.write_u32::<LittleEndian>(compare_op_to_u32(desc.compare_op)).unwrap();
    out.write_u32::<LittleEndian>(desc.anisotropy).unwrap();
}

fn read_sampler_desc(reader: &mut Cursor<&[u8]>) -> Result<rhi::SamplerDesc> {
    let mag_filter = filter_from_u32(read_u32(reader)?)?;
    let min_filter = filter_from_u32(read_u32(reader)?)?;
    let mipmap_mode = mipmap_mode_from_u32(read_u32(reader)?)?;
    let address_mode_u = address_mode_from_u32(read_u32(reader)?)?;
    let address_mode_v = address_mode_from_u32(read_u32(reader)?)?;
    let address_mode_w = address_mode_from_u32(read_u32(reader)?)?;
    let lod_bias = NotNan::new(read_f32(reader)?).map_err(|_| Error::from(AssetError::Truncated))?;
    let lod_min = NotNan::new(read_f32(reader)?).map_err(|_| Error::from(AssetError::Truncated))?;
    let lod_max = NotNan::new(read_f32(reader)?).map_err(|_| Error::from(AssetError::Truncated))?;
    let compare_op = compare_op_from_u32(read_u32(reader)?)?;
    let anisotropy = read_u32(reader)?;
    Ok(rhi::SamplerDesc {
        mag_filter,
        min_filter,
        mipmap_mode,
        address_mode_u,
        address_mode_v,
        address_mode_w,
        lod_bias,
        lod_min,
        lod_max,
        compare_op,
        anisotropy,
    })
}

fn write_texture_desc(out: &mut Vec<u8>, desc: &rhi::TextureDesc) {
    out.write_u32::<LittleEndian>(desc.extent.width).unwrap();
    out.write_u32::<LittleEndian>(desc.extent.height).unwrap();
    out.write_u32::<LittleEndian>(desc.extent.depth_or_layers).unwrap();
    out.write_u32::<LittleEndian>(desc.levels).unwrap();
    out.write_u32::<LittleEndian>(format_to_u32(desc.format)).unwrap();
    out.write_u32::<LittleEndian>(dim_to_u32(desc.dim)).unwrap();
    out.write_u32::<LittleEndian>(desc.usages.bits()).unwrap();
}

fn read_texture_desc(reader: &mut Cursor<&[u8]>) -> Result<rhi::TextureDesc> {
    let width = read_u32(reader)?;
    let height = read_u32(reader)?;
    let depth_or_layers = read_u32(reader)?;
    let levels = read_u32(reader)?;
    let format = format_from_u32(read_u32(reader)?)?;
    let dim = dim_from_u32(read_u32(reader)?)?;
    let usages = rhi::TextureUsage::from_bits(read_u32(reader)?)
        .ok_or_else(|| Error::from(AssetError::Truncated))?;
    Ok(rhi::TextureDesc {
        extent: rhi::Extent3d {
            width,
            height,
            depth_or_layers,
        },
        levels,
        format,
        dim,
        usages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> TextureAsset {
        TextureAsset {
            sampler: rhi::SamplerDesc {
                mag_filter: rhi::SamplerFilterMode::Linear,
                min_filter: rhi::SamplerFilterMode::Linear,
                mipmap_mode: rhi::SamplerMipmapMode::Linear,
                address_mode_u: rhi::SamplerAddressMode::Wrap,
                ..Default::default()
            },
            texture: rhi::TextureDesc {
                extent: rhi::Extent3d {
                    width: 16,
                    height: 8,
                    depth_or_layers: 1,
                },
                levels: 5,
                format: rhi::ResourceFormat::Bc7RgbaSrgb,
                dim: rhi::TextureDimension::D2,
                usages: rhi::TextureUsage::SAMPLED,
            },
            data: TextureAssetData::Raw(vec![1, 2, 3, 4]),
        }
    }

    #[test]
    fn texture_asset_survives_serialisation() {
        let saved = save_texture_asset(&sample_asset());
        let loaded = load_texture_asset(&saved).unwrap();
        assert_eq!(loaded.sampler, sample_asset().sampler);
        assert_eq!(loaded.texture, sample_asset().texture);
        match loaded.data {
            TextureAssetData::Raw(blob) => assert_eq!(blob, [1, 2, 3, 4]),
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut saved = save_texture_asset(&sample_asset());
        saved[0] ^= 0xff;
        match load_texture_asset(&saved) {
            Err(Error::Asset(AssetError::BadMagic { .. })) => {}
            other => panic!("expected bad magic, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wrong_type_name_is_rejected() {
        let mut saved = save_texture_asset(&sample_asset());
        // corrupt the type name in place
        saved[8] = b'x';
        match load_texture_asset(&saved) {
            Err(Error::Asset(AssetError::WrongTypeName { .. })) => {}
            other => panic!("expected type mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let saved = save_texture_asset(&sample_asset());
        match load_texture_asset(&saved[..saved.len() - 2]) {
            Err(Error::Asset(AssetError::Truncated)) => {}
            other => panic!("expected truncation, got {:?}", other.map(|_| ())),
        }
    }
}
